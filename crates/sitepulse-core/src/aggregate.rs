use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One immutable per-day rollup for a `(website_id, date)` pair.
///
/// Recomputation replaces the whole record — never merges — so repeated
/// aggregation runs are idempotent. Maps are `BTreeMap` so the serialized
/// form is deterministic and recomputes compare byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAggregate {
    pub website_id: String,
    pub date: NaiveDate,
    pub visitors: VisitorStats,
    pub sessions: SessionStats,
    pub pageviews: PageviewStats,
    pub events: EventStats,
    pub devices: DeviceSplit,
    pub traffic: TrafficSplit,
    pub conversions: ConversionStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VisitorStats {
    pub total: u64,
    pub unique: u64,
    /// Without a cross-day visitor ledger every unique visitor in the window
    /// counts as new; `returning` stays 0 until such a ledger exists.
    pub new: u64,
    pub returning: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub total: u64,
    pub average_duration_seconds: f64,
    /// Percent of sessions with exactly one page-producing event, 0-100.
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PageviewStats {
    pub total: u64,
    pub average_per_session: f64,
    /// Top 10 paths by view count, descending.
    pub top_pages: Vec<PageCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageCount {
    pub path: String,
    pub views: u64,
    pub unique_views: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventStats {
    pub by_type: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceSplit {
    pub desktop: u64,
    pub mobile: u64,
    pub tablet: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrafficSplit {
    /// Source label -> session-event count. Labels come from a fixed
    /// social/search hostname table, the bare referrer host, or "direct".
    pub sources: BTreeMap<String, u64>,
    pub countries: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversionStats {
    pub total: u64,
    /// conversions / sessions * 100; 0 when there are no sessions.
    pub rate: f64,
    pub revenue: f64,
}

impl DailyAggregate {
    /// A zero-filled record for a day with no data. Dashboard queries use
    /// this for gaps in the aggregate store so missing days never error.
    pub fn empty(website_id: &str, date: NaiveDate) -> Self {
        Self {
            website_id: website_id.to_string(),
            date,
            visitors: VisitorStats::default(),
            sessions: SessionStats::default(),
            pageviews: PageviewStats::default(),
            events: EventStats::default(),
            devices: DeviceSplit::default(),
            traffic: TrafficSplit::default(),
            conversions: ConversionStats::default(),
            generated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}
