use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use sitepulse_core::dashboard::DashboardRange;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub range: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `GET /api/websites/{id}/dashboard?range=7d[&start_date&end_date]`
///
/// Pure read path: loads the window's daily aggregates (zero-filling gaps),
/// the preceding equal-length comparison window, and the live realtime
/// block from raw events. Missing data renders zeros, never an error.
#[tracing::instrument(skip(state))]
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Query(q): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let range = DashboardRange::parse(q.range.as_deref().unwrap_or("7d"))
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let start = parse_date(q.start_date.as_deref(), "start_date")?;
    let end = parse_date(q.end_date.as_deref(), "end_date")?;

    let metrics = state
        .dashboard
        .get_dashboard(&website_id, range, start, end, Utc::now())
        .await
        .map_err(AppError::Internal)?;

    Ok(Json(json!({ "data": metrics })))
}

fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!("invalid {field} format, expected YYYY-MM-DD"))
        })
    })
    .transpose()
}
