use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dashboard::DashboardRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Area,
    Table,
    Metric,
    Funnel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    Between,
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFilter {
    pub field: String,
    pub operator: FilterOperator,
    pub value: serde_json::Value,
}

/// What a chart reads: a metric name (e.g. `visitors`, `top_pages`),
/// an optional dimension, and optional chart-local filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub metric: String,
    pub dimension: Option<String>,
    #[serde(default)]
    pub filters: Vec<ReportFilter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartPosition {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub chart_type: ChartType,
    pub title: String,
    pub data_source: DataSource,
    #[serde(default)]
    pub position: ChartPosition,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Date range a report resolves against: a named preset or explicit bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReportDateRange {
    Preset { range: DashboardRange },
    Explicit { start: NaiveDate, end: NaiveDate },
}

impl Default for ReportDateRange {
    fn default() -> Self {
        Self::Preset {
            range: DashboardRange::Last7d,
        }
    }
}

/// A user-authored report: a named, ordered collection of chart specs
/// resolved on demand against dashboard data (never pre-computed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomReport {
    pub id: String,
    pub website_id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub date_range: ReportDateRange,
    pub charts: Vec<ChartSpec>,
    #[serde(default)]
    pub filters: Vec<ReportFilter>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub date_range: ReportDateRange,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
    #[serde(default)]
    pub filters: Vec<ReportFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReportRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub date_range: Option<ReportDateRange>,
    pub charts: Option<Vec<ChartSpec>>,
    pub filters: Option<Vec<ReportFilter>>,
}
