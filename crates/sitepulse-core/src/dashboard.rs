use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named dashboard ranges. `custom` takes caller-supplied bounds and
/// defaults to a 7-day window when they are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DashboardRange {
    #[serde(rename = "24h")]
    Last24h,
    #[default]
    #[serde(rename = "7d")]
    Last7d,
    #[serde(rename = "30d")]
    Last30d,
    #[serde(rename = "90d")]
    Last90d,
    Custom,
}

impl DashboardRange {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "24h" => Ok(Self::Last24h),
            "7d" | "" => Ok(Self::Last7d),
            "30d" => Ok(Self::Last30d),
            "90d" => Ok(Self::Last90d),
            "custom" => Ok(Self::Custom),
            other => Err(anyhow!(
                "range must be one of: 24h, 7d, 30d, 90d, custom (got {other})"
            )),
        }
    }
}

/// Percentage change between two period values.
///
/// Convention: previous 0 and current positive -> 100; both 0 -> 0;
/// otherwise (current - previous) / previous * 100.
pub fn change_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A summed metric paired with its period-over-period change percentage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub total: f64,
    pub previous: f64,
    pub change: f64,
}

impl MetricSummary {
    pub fn new(total: f64, previous: f64) -> Self {
        Self {
            total,
            previous,
            change: change_pct(total, previous),
        }
    }
}

/// One entry of a ranked breakdown (top pages, sources, devices, countries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
    /// Share of the dimension total within the current period, 0-100.
    pub percentage: f64,
    /// Change vs the same key in the comparison period.
    pub change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub date: String,
    pub visitors: u64,
    pub pageviews: u64,
    pub conversions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Live figures computed straight from raw events in the trailing window,
/// bypassing the aggregate store for freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSnapshot {
    pub active_visitors: u64,
    pub active_sessions: u64,
    pub current_pageviews: u64,
}

/// The full request-scoped dashboard projection. Read-only; safe for the
/// caller to cache keyed on (website, range, bounds, minute bucket).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub website_id: String,
    pub period: Period,
    pub comparison: Period,
    pub visitors: MetricSummary,
    pub sessions: MetricSummary,
    pub pageviews: MetricSummary,
    pub conversions: MetricSummary,
    pub bounce_rate: MetricSummary,
    pub conversion_rate: MetricSummary,
    pub top_pages: Vec<RankedEntry>,
    pub traffic_sources: Vec<RankedEntry>,
    pub devices: Vec<RankedEntry>,
    pub countries: Vec<RankedEntry>,
    pub timeseries: Vec<TimeseriesPoint>,
    /// Percentage change between the first and last timeseries points.
    pub visitor_growth: f64,
    pub conversion_trend: Trend,
    pub realtime: RealtimeSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_conventions() {
        assert_eq!(change_pct(0.0, 0.0), 0.0);
        assert_eq!(change_pct(10.0, 0.0), 100.0);
        assert_eq!(change_pct(5.0, 10.0), -50.0);
        assert_eq!(change_pct(15.0, 10.0), 50.0);
    }

    #[test]
    fn range_parses_known_values() {
        assert_eq!(
            DashboardRange::parse("24h").expect("24h"),
            DashboardRange::Last24h
        );
        assert_eq!(
            DashboardRange::parse("custom").expect("custom"),
            DashboardRange::Custom
        );
        assert!(DashboardRange::parse("14d").is_err());
    }
}
