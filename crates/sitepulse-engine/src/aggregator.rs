//! The Aggregator: folds one day of raw events into a `DailyAggregate`.
//!
//! All accumulators are local to one call — nothing persists between runs —
//! and the resulting record replaces any existing one wholesale, so
//! re-running a day is idempotent.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info};

use sitepulse_core::aggregate::{
    ConversionStats, DailyAggregate, DeviceSplit, EventStats, PageCount, PageviewStats,
    SessionStats, TrafficSplit, VisitorStats,
};
use sitepulse_core::event::Event;

use crate::aggregates::AggregateStore;
use crate::events::{EventFilter, EventStore};
use crate::traffic::classify_source;

const TOP_PAGES_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct BatchOutcome {
    pub aggregated: usize,
    pub errors: usize,
}

struct SessionAcc {
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    page_events: u64,
}

pub struct Aggregator {
    events: Arc<EventStore>,
    aggregates: Arc<AggregateStore>,
}

impl Aggregator {
    pub fn new(events: Arc<EventStore>, aggregates: Arc<AggregateStore>) -> Self {
        Self { events, aggregates }
    }

    /// Aggregate one `(website_id, date)` day and persist the record,
    /// replacing any previous version.
    pub async fn aggregate_day(
        &self,
        website_id: &str,
        date: NaiveDate,
    ) -> Result<DailyAggregate> {
        let events = self
            .events
            .read(website_id, date, date, &EventFilter::default())
            .await?;

        let record = fold_day(website_id, date, &events, Utc::now());
        self.aggregates.put(&record).await?;
        info!(
            website_id,
            %date,
            events = events.len(),
            sessions = record.sessions.total,
            "day aggregated"
        );
        Ok(record)
    }

    /// Best-effort aggregation over a date range: one day's failure is
    /// counted and the rest proceed.
    pub async fn batch_aggregate(
        &self,
        website_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut day = start;
        while day <= end {
            match self.aggregate_day(website_id, day).await {
                Ok(_) => outcome.aggregated += 1,
                Err(err) => {
                    error!(website_id, date = %day, error = %err, "day aggregation failed");
                    outcome.errors += 1;
                }
            }
            day += chrono::Duration::days(1);
        }
        outcome
    }
}

/// Pure fold of a day's events into a record. `generated_at` is passed in so
/// idempotence tests can pin it.
pub fn fold_day(
    website_id: &str,
    date: NaiveDate,
    events: &[Event],
    generated_at: DateTime<Utc>,
) -> DailyAggregate {
    let mut visitors: HashSet<&str> = HashSet::new();
    let mut sessions: HashMap<&str, SessionAcc> = HashMap::new();
    let mut pages: HashMap<&str, (u64, HashSet<&str>)> = HashMap::new();
    let mut by_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_category: BTreeMap<String, u64> = BTreeMap::new();
    let mut devices = DeviceSplit::default();
    let mut sources: BTreeMap<String, u64> = BTreeMap::new();
    let mut countries: BTreeMap<String, u64> = BTreeMap::new();
    let mut conversions = 0u64;
    let mut revenue = 0.0f64;
    let mut pageview_total = 0u64;

    for event in events {
        visitors.insert(&event.visitor_id);

        let page_producing = event.is_page_producing();
        let acc = sessions
            .entry(&event.session_id)
            .or_insert_with(|| SessionAcc {
                first: event.timestamp,
                last: event.timestamp,
                page_events: 0,
            });
        acc.first = acc.first.min(event.timestamp);
        acc.last = acc.last.max(event.timestamp);
        if page_producing {
            acc.page_events += 1;
            pageview_total += 1;
        }

        if let Some(path) = event.path.as_deref().filter(|p| !p.is_empty()) {
            let (views, unique) = pages.entry(path).or_insert_with(|| (0, HashSet::new()));
            *views += 1;
            unique.insert(&event.visitor_id);
        }

        *by_type.entry(event.event_type.clone()).or_default() += 1;
        *by_category.entry(event.event_category.clone()).or_default() += 1;

        match event.device.device_type.as_str() {
            "mobile" => devices.mobile += 1,
            "tablet" => devices.tablet += 1,
            _ => devices.desktop += 1,
        }

        *sources
            .entry(classify_source(event.referrer.as_deref()))
            .or_default() += 1;
        if let Some(country) = event
            .location
            .as_ref()
            .and_then(|l| l.country.as_deref())
            .filter(|c| !c.is_empty())
        {
            *countries.entry(country.to_string()).or_default() += 1;
        }

        if event.event_type == "conversion" || event.event_type == "purchase" {
            conversions += 1;
            revenue += event.event_value.unwrap_or(0.0);
            revenue += event
                .metadata
                .get("revenue")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
        }
    }

    let session_total = sessions.len() as u64;
    let bounced = sessions.values().filter(|s| s.page_events == 1).count() as u64;
    let duration_sum: i64 = sessions
        .values()
        .map(|s| (s.last - s.first).num_seconds())
        .sum();

    // Zero-session days must produce zeros, never NaN.
    let (bounce_rate, average_duration, average_pageviews, conversion_rate) = if session_total == 0
    {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let n = session_total as f64;
        (
            bounced as f64 / n * 100.0,
            duration_sum as f64 / n,
            pageview_total as f64 / n,
            conversions as f64 / n * 100.0,
        )
    };

    let mut top_pages: Vec<PageCount> = pages
        .into_iter()
        .map(|(path, (views, unique))| PageCount {
            path: path.to_string(),
            views,
            unique_views: unique.len() as u64,
        })
        .collect();
    top_pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.path.cmp(&b.path)));
    top_pages.truncate(TOP_PAGES_LIMIT);

    let unique_visitors = visitors.len() as u64;

    DailyAggregate {
        website_id: website_id.to_string(),
        date,
        visitors: VisitorStats {
            total: unique_visitors,
            unique: unique_visitors,
            // No cross-day visitor ledger: everyone in the window counts as new.
            new: unique_visitors,
            returning: 0,
        },
        sessions: SessionStats {
            total: session_total,
            average_duration_seconds: average_duration,
            bounce_rate,
        },
        pageviews: PageviewStats {
            total: pageview_total,
            average_per_session: average_pageviews,
            top_pages,
        },
        events: EventStats {
            by_type,
            by_category,
        },
        devices,
        traffic: TrafficSplit { sources, countries },
        conversions: ConversionStats {
            total: conversions,
            rate: conversion_rate,
            revenue,
        },
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitepulse_core::device::DeviceInfo;
    use sitepulse_core::event::GeoLocation;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, h, m, s).single().expect("ts")
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).expect("date")
    }

    fn pageview(session: &str, visitor: &str, path: &str, at: DateTime<Utc>) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            website_id: "site-a".to_string(),
            session_id: session.to_string(),
            visitor_id: visitor.to_string(),
            event_type: "pageview".to_string(),
            event_category: "page".to_string(),
            event_action: "view".to_string(),
            event_label: None,
            event_value: None,
            path: Some(path.to_string()),
            referrer: None,
            user_agent: None,
            ip: None,
            device: DeviceInfo::default(),
            location: Some(GeoLocation {
                country: Some("DE".to_string()),
                region: None,
                city: None,
            }),
            metadata: serde_json::json!({}),
            timestamp: at,
        }
    }

    /// 20 sessions from 20 visitors, 100 pageviews, 5 single-pageview
    /// sessions: bounce rate must be exactly 25 %.
    fn scenario_events() -> Vec<Event> {
        let mut events = Vec::new();
        // 5 bounce sessions: one pageview each.
        for i in 0..5u32 {
            events.push(pageview(
                &format!("s{i}"),
                &format!("v{i}"),
                "/landing",
                ts(9, i, 0),
            ));
        }
        // 15 sessions with the remaining 95 pageviews spread across them.
        let mut remaining = 95u32;
        for i in 5..20u32 {
            let count = if i < 19 { 6 } else { remaining };
            for j in 0..count {
                events.push(pageview(
                    &format!("s{i}"),
                    &format!("v{i}"),
                    if j % 2 == 0 { "/home" } else { "/pricing" },
                    ts(10, i, j),
                ));
            }
            remaining -= count;
        }
        events
    }

    #[test]
    fn scenario_sessions_and_bounce_rate() {
        let record = fold_day("site-a", day(), &scenario_events(), ts(23, 0, 0));
        assert_eq!(record.sessions.total, 20);
        assert_eq!(record.visitors.total, 20);
        assert_eq!(record.pageviews.total, 100);
        assert!((record.sessions.bounce_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_sessions_yield_zero_rates() {
        let record = fold_day("site-a", day(), &[], ts(0, 0, 0));
        assert_eq!(record.sessions.bounce_rate, 0.0);
        assert_eq!(record.pageviews.average_per_session, 0.0);
        assert_eq!(record.conversions.rate, 0.0);
        assert_eq!(record.sessions.average_duration_seconds, 0.0);
    }

    #[test]
    fn recompute_is_byte_identical() {
        let events = scenario_events();
        let generated_at = ts(23, 30, 0);
        let a = fold_day("site-a", day(), &events, generated_at);
        let b = fold_day("site-a", day(), &events, generated_at);
        let a_json = serde_json::to_vec(&a).expect("serialize a");
        let b_json = serde_json::to_vec(&b).expect("serialize b");
        assert_eq!(a_json, b_json);
    }

    #[test]
    fn conservation_bounds_hold() {
        let record = fold_day("site-a", day(), &scenario_events(), ts(23, 0, 0));
        let top_views: u64 = record.pageviews.top_pages.iter().map(|p| p.views).sum();
        assert!(top_views <= record.pageviews.total);
        assert!((0.0..=100.0).contains(&record.sessions.bounce_rate));
        assert!(record.conversions.rate >= 0.0);
        let device_total =
            record.devices.desktop + record.devices.mobile + record.devices.tablet;
        assert_eq!(device_total, scenario_events().len() as u64);
    }

    #[test]
    fn conversions_accumulate_value_and_metadata_revenue() {
        let mut purchase = pageview("s1", "v1", "/checkout", ts(12, 0, 0));
        purchase.event_type = "purchase".to_string();
        purchase.event_category = "ecommerce".to_string();
        purchase.event_value = Some(19.5);
        purchase.metadata = serde_json::json!({ "revenue": 10.5 });
        let mut conversion = pageview("s1", "v1", "/thanks", ts(12, 1, 0));
        conversion.event_type = "conversion".to_string();

        let record = fold_day("site-a", day(), &[purchase, conversion], ts(23, 0, 0));
        assert_eq!(record.conversions.total, 2);
        assert!((record.conversions.revenue - 30.0).abs() < 1e-9);
        // One session, more than one page event: no bounce.
        assert_eq!(record.sessions.bounce_rate, 0.0);
        assert!((record.conversions.rate - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn session_duration_is_max_minus_min() {
        let events = vec![
            pageview("s1", "v1", "/a", ts(10, 0, 0)),
            pageview("s1", "v1", "/b", ts(10, 2, 30)),
        ];
        let record = fold_day("site-a", day(), &events, ts(23, 0, 0));
        assert!((record.sessions.average_duration_seconds - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn top_pages_are_ranked_and_truncated() {
        let mut events = Vec::new();
        for page in 0..12 {
            for view in 0..=page {
                events.push(pageview(
                    &format!("s{page}-{view}"),
                    "v1",
                    &format!("/p{page:02}"),
                    ts(8, page, view),
                ));
            }
        }
        let record = fold_day("site-a", day(), &events, ts(23, 0, 0));
        assert_eq!(record.pageviews.top_pages.len(), 10);
        assert_eq!(record.pageviews.top_pages[0].path, "/p11");
        assert_eq!(record.pageviews.top_pages[0].views, 12);
    }
}
