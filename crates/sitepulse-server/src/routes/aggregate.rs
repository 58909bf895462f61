use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// `POST /api/websites/{id}/aggregate` — recompute daily aggregates.
///
/// `{ "date": "YYYY-MM-DD" }` recomputes one day and returns the record;
/// `{ "start_date", "end_date" }` recomputes a range best-effort and
/// returns `{ aggregated, errors }`. Recomputing is idempotent: the new
/// record replaces the old one wholesale.
#[tracing::instrument(skip(state, req))]
pub async fn aggregate(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Json(req): Json<AggregateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(date) = req.date {
        let record = state
            .aggregator
            .aggregate_day(&website_id, date)
            .await
            .map_err(AppError::Internal)?;
        return Ok(Json(json!({ "data": record })));
    }

    match (req.start_date, req.end_date) {
        (Some(start), Some(end)) => {
            if end < start {
                return Err(AppError::BadRequest(
                    "end_date must not precede start_date".to_string(),
                ));
            }
            let outcome = state.aggregator.batch_aggregate(&website_id, start, end).await;
            Ok(Json(json!({ "data": outcome })))
        }
        _ => Err(AppError::BadRequest(
            "provide either date, or start_date and end_date".to_string(),
        )),
    }
}
