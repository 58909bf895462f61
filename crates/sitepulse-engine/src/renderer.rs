//! The Report Renderer: resolves a custom report's chart specs against an
//! already-computed `DashboardMetrics`, then serializes the result as CSV,
//! a JSON dump, or a styled HTML document suitable for PDF conversion.

use std::borrow::Cow;
use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use sitepulse_core::dashboard::{DashboardMetrics, RankedEntry};
use sitepulse_core::report::{ChartSpec, ChartType, CustomReport};

/// Resolve every chart of `report` into tabular/series data, keyed by chart
/// id. Unknown `(metric, chart_type)` pairings resolve to an empty array —
/// a report always renders, degrading per chart rather than erroring.
pub fn generate_report_data(
    report: &CustomReport,
    metrics: &DashboardMetrics,
) -> BTreeMap<String, Value> {
    report
        .charts
        .iter()
        .map(|chart| (chart.id.clone(), resolve_chart(chart, metrics)))
        .collect()
}

/// Explicit dispatch table on `(data_source.metric, chart_type)`.
fn resolve_chart(chart: &ChartSpec, metrics: &DashboardMetrics) -> Value {
    let metric = chart.data_source.metric.as_str();
    match (metric, chart.chart_type) {
        // Time-series shapes.
        ("visitors", ChartType::Line | ChartType::Area) => series(metrics, |p| p.visitors),
        ("pageviews", ChartType::Line | ChartType::Area) => series(metrics, |p| p.pageviews),
        ("conversions", ChartType::Line | ChartType::Area) => series(metrics, |p| p.conversions),

        // Ranked shapes.
        ("top_pages", ChartType::Table) => page_rows(&metrics.top_pages),
        ("top_pages", ChartType::Bar | ChartType::Pie) => slices(&metrics.top_pages),
        ("traffic_sources", ChartType::Table) => ranked_rows(&metrics.traffic_sources, "source"),
        ("traffic_sources", ChartType::Bar | ChartType::Pie) => slices(&metrics.traffic_sources),
        ("devices", ChartType::Table) => ranked_rows(&metrics.devices, "device"),
        ("devices", ChartType::Bar | ChartType::Pie) => slices(&metrics.devices),
        ("countries", ChartType::Table) => ranked_rows(&metrics.countries, "country"),
        ("countries", ChartType::Bar | ChartType::Pie) => slices(&metrics.countries),

        // Single value + delta.
        ("visitors", ChartType::Metric) => metric_value(&metrics.visitors),
        ("sessions", ChartType::Metric) => metric_value(&metrics.sessions),
        ("pageviews", ChartType::Metric) => metric_value(&metrics.pageviews),
        ("conversions", ChartType::Metric) => metric_value(&metrics.conversions),
        ("bounce_rate", ChartType::Metric) => metric_value(&metrics.bounce_rate),
        ("conversion_rate", ChartType::Metric) => metric_value(&metrics.conversion_rate),

        // Everything else renders empty.
        _ => json!([]),
    }
}

fn series<F: Fn(&sitepulse_core::dashboard::TimeseriesPoint) -> u64>(
    metrics: &DashboardMetrics,
    pick: F,
) -> Value {
    Value::Array(
        metrics
            .timeseries
            .iter()
            .map(|point| json!({ "date": point.date, "value": pick(point) }))
            .collect(),
    )
}

fn page_rows(entries: &[RankedEntry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|e| {
                json!({
                    "path": e.key,
                    "views": e.count,
                    "percentage": e.percentage,
                    "change": e.change,
                })
            })
            .collect(),
    )
}

fn ranked_rows(entries: &[RankedEntry], key_name: &str) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|e| {
                let mut row = serde_json::Map::new();
                row.insert(key_name.to_string(), json!(e.key));
                row.insert("count".to_string(), json!(e.count));
                row.insert("percentage".to_string(), json!(e.percentage));
                row.insert("change".to_string(), json!(e.change));
                Value::Object(row)
            })
            .collect(),
    )
}

fn slices(entries: &[RankedEntry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|e| json!({ "label": e.key, "value": e.count }))
            .collect(),
    )
}

fn metric_value(summary: &sitepulse_core::dashboard::MetricSummary) -> Value {
    json!({
        "value": summary.total,
        "previous": summary.previous,
        "change": summary.change,
    })
}

/// Flatten resolved chart data into CSV: per chart a title line, a header
/// row from the row-object keys, the data rows, then a blank separator line.
pub fn to_csv(report: &CustomReport, data: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    for chart in &report.charts {
        wtr.write_record([sanitize_field(&chart.title).as_ref()])?;
        let resolved = data.get(&chart.id).cloned().unwrap_or(json!([]));
        let rows = match resolved {
            Value::Array(rows) => rows,
            single @ Value::Object(_) => vec![single],
            _ => vec![],
        };
        if let Some(Value::Object(first)) = rows.first() {
            let headers: Vec<String> = first.keys().cloned().collect();
            wtr.write_record(headers.iter().map(|h| sanitize_field(h).into_owned()))?;
            for row in &rows {
                if let Value::Object(map) = row {
                    let record: Vec<String> = headers
                        .iter()
                        .map(|h| sanitize_field(&display_value(map.get(h))).into_owned())
                        .collect();
                    wtr.write_record(&record)?;
                }
            }
        }
        wtr.write_record([""])?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("csv flush failed: {e}"))
}

/// A structured dump of the whole resolved report.
pub fn to_json(
    report: &CustomReport,
    data: &BTreeMap<String, Value>,
    generated_at: DateTime<Utc>,
) -> Value {
    json!({
        "report_id": report.id,
        "website_id": report.website_id,
        "name": report.name,
        "generated_at": generated_at.to_rfc3339(),
        "date_range": report.date_range,
        "charts": data,
    })
}

/// A self-contained styled HTML document: report name, generation timestamp,
/// date range, and one table per chart. This is the payload handed to
/// downstream PDF conversion.
pub fn to_document(
    report: &CustomReport,
    data: &BTreeMap<String, Value>,
    generated_at: DateTime<Utc>,
) -> String {
    let mut body = String::new();
    for chart in &report.charts {
        body.push_str(&format!("<h2>{}</h2>\n", escape_html(&chart.title)));
        let resolved = data.get(&chart.id).cloned().unwrap_or(json!([]));
        let rows = match resolved {
            Value::Array(rows) => rows,
            single @ Value::Object(_) => vec![single],
            _ => vec![],
        };
        if let Some(Value::Object(first)) = rows.first() {
            let headers: Vec<String> = first.keys().cloned().collect();
            body.push_str("<table><thead><tr>");
            for header in &headers {
                body.push_str(&format!("<th>{}</th>", escape_html(header)));
            }
            body.push_str("</tr></thead><tbody>\n");
            for row in &rows {
                if let Value::Object(map) = row {
                    body.push_str("<tr>");
                    for header in &headers {
                        body.push_str(&format!(
                            "<td>{}</td>",
                            escape_html(&display_value(map.get(header)))
                        ));
                    }
                    body.push_str("</tr>\n");
                }
            }
            body.push_str("</tbody></table>\n");
        } else {
            body.push_str("<p class=\"empty\">No data for this chart.</p>\n");
        }
    }

    let range_label = match &report.date_range {
        sitepulse_core::report::ReportDateRange::Preset { range } => format!("{range:?}"),
        sitepulse_core::report::ReportDateRange::Explicit { start, end } => {
            format!("{start} to {end}")
        }
    };

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <title>{title}</title>\
         <style>\
         body{{font-family:sans-serif;margin:2rem;color:#1a202c}}\
         h1{{border-bottom:2px solid #2b6cb0;padding-bottom:.5rem}}\
         h2{{margin-top:2rem;color:#2b6cb0}}\
         table{{border-collapse:collapse;width:100%}}\
         th,td{{border:1px solid #cbd5e0;padding:.4rem .6rem;text-align:left}}\
         th{{background:#ebf8ff}}\
         .meta{{color:#718096;font-size:.9rem}}\
         .empty{{color:#a0aec0;font-style:italic}}\
         </style></head><body>\n\
         <h1>{title}</h1>\n\
         <p class=\"meta\">Generated {generated} &middot; Range: {range}</p>\n\
         {body}</body></html>\n",
        title = escape_html(&report.name),
        generated = generated_at.to_rfc3339(),
        range = escape_html(&range_label),
        body = body,
    )
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Spreadsheet apps treat leading `=`, `+`, `-`, `@`, TAB, or CR as formula
/// expressions; a leading quote forces literal interpretation.
fn sanitize_field(val: &str) -> Cow<'_, str> {
    if val.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        Cow::Owned(format!("'{val}"))
    } else {
        Cow::Borrowed(val)
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepulse_core::dashboard::{
        DashboardRange, MetricSummary, Period, RealtimeSnapshot, TimeseriesPoint, Trend,
    };
    use sitepulse_core::report::{ChartPosition, DataSource, ReportDateRange};

    fn metrics() -> DashboardMetrics {
        let now = Utc::now();
        DashboardMetrics {
            website_id: "site-a".to_string(),
            period: Period { start: now, end: now },
            comparison: Period { start: now, end: now },
            visitors: MetricSummary::new(30.0, 15.0),
            sessions: MetricSummary::new(25.0, 20.0),
            pageviews: MetricSummary::new(120.0, 90.0),
            conversions: MetricSummary::new(4.0, 2.0),
            bounce_rate: MetricSummary::new(40.0, 45.0),
            conversion_rate: MetricSummary::new(10.0, 9.0),
            top_pages: vec![
                entry("/home", 60),
                entry("/pricing", 40),
                entry("/about", 20),
            ],
            traffic_sources: vec![entry("Google", 18), entry("direct", 12)],
            devices: vec![entry("desktop", 20), entry("mobile", 10)],
            countries: vec![entry("DE", 25)],
            timeseries: vec![
                TimeseriesPoint {
                    date: "2026-08-20".to_string(),
                    visitors: 10,
                    pageviews: 50,
                    conversions: 1,
                },
                TimeseriesPoint {
                    date: "2026-08-21".to_string(),
                    visitors: 20,
                    pageviews: 70,
                    conversions: 3,
                },
            ],
            visitor_growth: 100.0,
            conversion_trend: Trend::Up,
            realtime: RealtimeSnapshot {
                active_visitors: 0,
                active_sessions: 0,
                current_pageviews: 0,
            },
        }
    }

    fn entry(key: &str, count: u64) -> RankedEntry {
        RankedEntry {
            key: key.to_string(),
            count,
            percentage: 0.0,
            change: 0.0,
        }
    }

    fn chart(id: &str, metric: &str, chart_type: ChartType) -> ChartSpec {
        ChartSpec {
            id: id.to_string(),
            chart_type,
            title: format!("{metric} chart"),
            data_source: DataSource {
                metric: metric.to_string(),
                dimension: None,
                filters: vec![],
            },
            position: ChartPosition::default(),
            config: json!({}),
        }
    }

    fn report(charts: Vec<ChartSpec>) -> CustomReport {
        CustomReport {
            id: "r1".to_string(),
            website_id: "site-a".to_string(),
            name: "Weekly KPI".to_string(),
            description: None,
            date_range: ReportDateRange::Preset {
                range: DashboardRange::Last7d,
            },
            charts,
            filters: vec![],
            created_at: "2026-08-01T00:00:00Z".to_string(),
            updated_at: "2026-08-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn line_chart_resolves_to_timeseries_pairs() {
        let report = report(vec![chart("c1", "visitors", ChartType::Line)]);
        let data = generate_report_data(&report, &metrics());
        let rows = data["c1"].as_array().expect("array");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["value"], 20);
    }

    #[test]
    fn unknown_pairing_resolves_to_empty_not_error() {
        let report = report(vec![chart("c1", "visitors", ChartType::Funnel)]);
        let data = generate_report_data(&report, &metrics());
        assert_eq!(data["c1"], json!([]));
    }

    #[test]
    fn metric_chart_resolves_to_value_and_change() {
        let report = report(vec![chart("c1", "bounce_rate", ChartType::Metric)]);
        let data = generate_report_data(&report, &metrics());
        assert_eq!(data["c1"]["value"], 40.0);
        assert_eq!(data["c1"]["previous"], 45.0);
    }

    #[test]
    fn top_pages_table_exports_header_plus_three_rows() {
        let report = report(vec![chart("c1", "top_pages", ChartType::Table)]);
        let data = generate_report_data(&report, &metrics());
        let csv_bytes = to_csv(&report, &data).expect("csv");
        let text = String::from_utf8(csv_bytes).expect("utf8");
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        // Title line, header line, 3 data rows.
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("path"));
        assert!(lines[1].contains("views"));
        assert!(lines[2].contains("/home"));
    }

    #[test]
    fn document_embeds_name_range_and_tables() {
        let report = report(vec![
            chart("c1", "top_pages", ChartType::Table),
            chart("c2", "nonsense", ChartType::Line),
        ]);
        let data = generate_report_data(&report, &metrics());
        let html = to_document(&report, &data, Utc::now());
        assert!(html.contains("<h1>Weekly KPI</h1>"));
        assert!(html.contains("<table>"));
        assert!(html.contains("No data for this chart."));
    }

    #[test]
    fn csv_fields_are_sanitized_against_formula_injection() {
        let mut m = metrics();
        m.top_pages = vec![entry("=HYPERLINK(\"x\")", 5)];
        let report = report(vec![chart("c1", "top_pages", ChartType::Table)]);
        let data = generate_report_data(&report, &m);
        let text = String::from_utf8(to_csv(&report, &data).expect("csv")).expect("utf8");
        assert!(text.contains("'=HYPERLINK"));
    }
}
