use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use sitepulse_core::schedule::{
    compute_next_send, CreateScheduleRequest, UpdateScheduleRequest,
};

use crate::{error::AppError, scheduler, state::AppState};

/// `GET /api/websites/{id}/schedules`
#[tracing::instrument(skip(state))]
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let items = state
        .schedules
        .list(&website_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(json!({ "data": items })))
}

/// `POST /api/websites/{id}/schedules` — the recurrence rule is validated
/// here: `next_send` is computed up front and a rule that cannot produce
/// one is rejected with 400.
#[tracing::instrument(skip(state, req))]
pub async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.recipients.is_empty() {
        return Err(AppError::BadRequest(
            "recipients must not be empty".to_string(),
        ));
    }
    state
        .reports
        .get(&website_id, &req.report_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::BadRequest(format!("unknown report {}", req.report_id)))?;

    let next_send =
        compute_next_send(&req.schedule, Utc::now()).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let item = state
        .schedules
        .create(&website_id, req, next_send)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((StatusCode::CREATED, Json(json!({ "data": item }))))
}

/// `GET /api/websites/{id}/schedules/{schedule_id}`
#[tracing::instrument(skip(state))]
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    Path((website_id, schedule_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let item = state
        .schedules
        .get(&website_id, &schedule_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id}")))?;
    Ok(Json(json!({ "data": item })))
}

/// `PUT /api/websites/{id}/schedules/{schedule_id}` — every save recomputes
/// `next_send` from the (possibly unchanged) rule.
#[tracing::instrument(skip(state, req))]
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Path((website_id, schedule_id)): Path<(String, String)>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let existing = state
        .schedules
        .get(&website_id, &schedule_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id}")))?;

    if req.recipients.as_ref().is_some_and(|r| r.is_empty()) {
        return Err(AppError::BadRequest(
            "recipients must not be empty".to_string(),
        ));
    }
    let rule = req.schedule.as_ref().unwrap_or(&existing.schedule);
    let next_send =
        compute_next_send(rule, Utc::now()).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let item = state
        .schedules
        .update(&website_id, &schedule_id, req, next_send)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("schedule {schedule_id}")))?;
    Ok(Json(json!({ "data": item })))
}

/// `DELETE /api/websites/{id}/schedules/{schedule_id}`
#[tracing::instrument(skip(state))]
pub async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path((website_id, schedule_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .schedules
        .delete(&website_id, &schedule_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    if !deleted {
        return Err(AppError::NotFound(format!("schedule {schedule_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/websites/{id}/schedules/process` — run one delivery pass for
/// this website immediately instead of waiting for the background tick.
/// Returns `{ "sent": n, "errors": m }`; if a pass for this website is
/// already in flight the response carries zeros plus `"skipped": true`.
#[tracing::instrument(skip(state))]
pub async fn process_schedules(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match scheduler::process_website(&state, &website_id, Utc::now()).await {
        Some(outcome) => Ok(Json(json!({ "data": outcome }))),
        None => Ok(Json(
            json!({ "data": { "sent": 0, "errors": 0, "skipped": true } }),
        )),
    }
}
