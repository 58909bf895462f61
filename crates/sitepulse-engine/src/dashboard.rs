//! The Dashboard Query Engine: a pure read path that folds per-day
//! aggregates into period summaries, joins ranked dimensions against the
//! immediately preceding period of equal length, and layers a live window
//! computed straight from raw events.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use sitepulse_core::aggregate::DailyAggregate;
use sitepulse_core::dashboard::{
    change_pct, DashboardMetrics, DashboardRange, MetricSummary, Period, RankedEntry,
    RealtimeSnapshot, TimeseriesPoint, Trend,
};

use crate::aggregates::AggregateStore;
use crate::events::EventStore;

const RANKED_LIMIT: usize = 10;
/// Conversion-rate moves inside this band (percentage points) are `stable`.
const TREND_BAND: f64 = 0.1;

pub struct DashboardEngine {
    aggregates: Arc<AggregateStore>,
    events: Arc<EventStore>,
    realtime_window: Duration,
}

/// Summed/averaged totals for one period, plus the merged dimension maps the
/// ranked breakdowns join on.
#[derive(Default)]
struct PeriodTotals {
    visitors: f64,
    sessions: f64,
    pageviews: f64,
    conversions: f64,
    bounce_rate: f64,
    conversion_rate: f64,
    pages: BTreeMap<String, u64>,
    sources: BTreeMap<String, u64>,
    devices: BTreeMap<String, u64>,
    countries: BTreeMap<String, u64>,
}

impl DashboardEngine {
    pub fn new(
        aggregates: Arc<AggregateStore>,
        events: Arc<EventStore>,
        realtime_window_secs: u64,
    ) -> Self {
        Self {
            aggregates,
            events,
            realtime_window: Duration::seconds(realtime_window_secs as i64),
        }
    }

    pub async fn get_dashboard(
        &self,
        website_id: &str,
        range: DashboardRange,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<DashboardMetrics> {
        let period = resolve_period(range, start, end, now)?;
        let span = period.end - period.start;
        let comparison = Period {
            start: period.start - span,
            end: period.start,
        };

        let current_days = load_days(
            &self.aggregates,
            website_id,
            period.start.date_naive(),
            period.end.date_naive(),
        )
        .await?;
        let previous_days = load_days(
            &self.aggregates,
            website_id,
            comparison.start.date_naive(),
            comparison.end.date_naive(),
        )
        .await?;

        let current = fold_period(&current_days);
        let previous = fold_period(&previous_days);

        let timeseries: Vec<TimeseriesPoint> = current_days
            .iter()
            .map(|(date, record)| TimeseriesPoint {
                date: date.to_string(),
                visitors: record.visitors.total,
                pageviews: record.pageviews.total,
                conversions: record.conversions.total,
            })
            .collect();

        let visitor_growth = match (timeseries.first(), timeseries.last()) {
            (Some(first), Some(last)) if timeseries.len() > 1 => {
                change_pct(last.visitors as f64, first.visitors as f64)
            }
            _ => 0.0,
        };

        let conversion_trend = {
            let diff = current.conversion_rate - previous.conversion_rate;
            if diff > TREND_BAND {
                Trend::Up
            } else if diff < -TREND_BAND {
                Trend::Down
            } else {
                Trend::Stable
            }
        };

        let realtime = self.realtime(website_id, now).await?;

        Ok(DashboardMetrics {
            website_id: website_id.to_string(),
            visitors: MetricSummary::new(current.visitors, previous.visitors),
            sessions: MetricSummary::new(current.sessions, previous.sessions),
            pageviews: MetricSummary::new(current.pageviews, previous.pageviews),
            conversions: MetricSummary::new(current.conversions, previous.conversions),
            bounce_rate: MetricSummary::new(current.bounce_rate, previous.bounce_rate),
            conversion_rate: MetricSummary::new(current.conversion_rate, previous.conversion_rate),
            top_pages: ranked(&current.pages, &previous.pages),
            traffic_sources: ranked(&current.sources, &previous.sources),
            devices: ranked(&current.devices, &previous.devices),
            countries: ranked(&current.countries, &previous.countries),
            timeseries,
            visitor_growth,
            conversion_trend,
            realtime,
            period,
            comparison,
        })
    }

    /// Live figures from the trailing window of raw events, bypassing the
    /// aggregate store entirely.
    async fn realtime(&self, website_id: &str, now: DateTime<Utc>) -> Result<RealtimeSnapshot> {
        let events = self
            .events
            .read_window(website_id, now - self.realtime_window, now)
            .await?;
        let mut visitors = std::collections::HashSet::new();
        let mut sessions = std::collections::HashSet::new();
        let mut pageviews = 0u64;
        for event in &events {
            visitors.insert(event.visitor_id.as_str());
            sessions.insert(event.session_id.as_str());
            if event.is_page_producing() {
                pageviews += 1;
            }
        }
        Ok(RealtimeSnapshot {
            active_visitors: visitors.len() as u64,
            active_sessions: sessions.len() as u64,
            current_pageviews: pageviews,
        })
    }
}

fn resolve_period(
    range: DashboardRange,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<Period> {
    let period = match range {
        DashboardRange::Last24h => Period {
            start: now - Duration::hours(24),
            end: now,
        },
        DashboardRange::Last7d => Period {
            start: now - Duration::days(7),
            end: now,
        },
        DashboardRange::Last30d => Period {
            start: now - Duration::days(30),
            end: now,
        },
        DashboardRange::Last90d => Period {
            start: now - Duration::days(90),
            end: now,
        },
        DashboardRange::Custom => {
            // Caller-supplied bounds; absent bounds fall back to 7 days.
            match (start, end) {
                (Some(s), Some(e)) => {
                    if e < s {
                        anyhow::bail!("end_date must be on or after start_date");
                    }
                    Period {
                        start: s.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc(),
                        end: e.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc(),
                    }
                }
                _ => Period {
                    start: now - Duration::days(7),
                    end: now,
                },
            }
        }
    };
    Ok(period)
}

/// Load every day in the window, zero-filling the gaps so a missing daily
/// record never surfaces as an error.
async fn load_days(
    store: &AggregateStore,
    website_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<(NaiveDate, DailyAggregate)>> {
    let present = store.get_range(website_id, start, end).await?;
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        let record = present
            .get(&day)
            .cloned()
            .unwrap_or_else(|| DailyAggregate::empty(website_id, day));
        out.push((day, record));
        day += Duration::days(1);
    }
    Ok(out)
}

/// Counts are summed; rates are a plain mean over the days that actually
/// have data, matching the aggregator's per-day granularity.
fn fold_period(days: &[(NaiveDate, DailyAggregate)]) -> PeriodTotals {
    let mut totals = PeriodTotals::default();
    let mut days_with_data = 0u32;

    for (_, record) in days {
        totals.visitors += record.visitors.total as f64;
        totals.sessions += record.sessions.total as f64;
        totals.pageviews += record.pageviews.total as f64;
        totals.conversions += record.conversions.total as f64;

        if record.sessions.total > 0 {
            days_with_data += 1;
            totals.bounce_rate += record.sessions.bounce_rate;
            totals.conversion_rate += record.conversions.rate;
        }

        for page in &record.pageviews.top_pages {
            *totals.pages.entry(page.path.clone()).or_default() += page.views;
        }
        for (source, count) in &record.traffic.sources {
            *totals.sources.entry(source.clone()).or_default() += count;
        }
        for (country, count) in &record.traffic.countries {
            *totals.countries.entry(country.clone()).or_default() += count;
        }
        *totals.devices.entry("desktop".to_string()).or_default() += record.devices.desktop;
        *totals.devices.entry("mobile".to_string()).or_default() += record.devices.mobile;
        *totals.devices.entry("tablet".to_string()).or_default() += record.devices.tablet;
    }

    totals.devices.retain(|_, count| *count > 0);
    if days_with_data > 0 {
        totals.bounce_rate /= f64::from(days_with_data);
        totals.conversion_rate /= f64::from(days_with_data);
    }
    totals
}

/// Rank a merged dimension map, attaching each key's share of the dimension
/// total and its change against the previous period's count for that key.
fn ranked(current: &BTreeMap<String, u64>, previous: &BTreeMap<String, u64>) -> Vec<RankedEntry> {
    let dimension_total: u64 = current.values().sum();
    let mut entries: Vec<RankedEntry> = current
        .iter()
        .map(|(key, count)| RankedEntry {
            key: key.clone(),
            count: *count,
            percentage: if dimension_total == 0 {
                0.0
            } else {
                *count as f64 / dimension_total as f64 * 100.0
            },
            change: change_pct(
                *count as f64,
                previous.get(key).copied().unwrap_or(0) as f64,
            ),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(RANKED_LIMIT);
    entries
}
