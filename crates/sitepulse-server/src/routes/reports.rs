use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use sitepulse_core::dashboard::{DashboardMetrics, DashboardRange};
use sitepulse_core::report::{
    CreateReportRequest, CustomReport, ReportDateRange, UpdateReportRequest,
};
use sitepulse_core::schedule::ReportFormat;
use sitepulse_engine::renderer;

use crate::{error::AppError, state::AppState};

/// `GET /api/websites/{id}/reports`
#[tracing::instrument(skip(state))]
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let reports = state
        .reports
        .list(&website_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(json!({ "data": reports })))
}

/// `POST /api/websites/{id}/reports`
#[tracing::instrument(skip(state, req))]
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    Path(website_id): Path<String>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    let report = state
        .reports
        .create(&website_id, req)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok((StatusCode::CREATED, Json(json!({ "data": report }))))
}

/// `GET /api/websites/{id}/reports/{report_id}`
#[tracing::instrument(skip(state))]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path((website_id, report_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_report(&state, &website_id, &report_id).await?;
    Ok(Json(json!({ "data": report })))
}

/// `PUT /api/websites/{id}/reports/{report_id}`
#[tracing::instrument(skip(state, req))]
pub async fn update_report(
    State(state): State<Arc<AppState>>,
    Path((website_id, report_id)): Path<(String, String)>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    let report = state
        .reports
        .update(&website_id, &report_id, req)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("report {report_id}")))?;
    Ok(Json(json!({ "data": report })))
}

/// `DELETE /api/websites/{id}/reports/{report_id}`
#[tracing::instrument(skip(state))]
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path((website_id, report_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .reports
        .delete(&website_id, &report_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    if !deleted {
        return Err(AppError::NotFound(format!("report {report_id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/websites/{id}/reports/{report_id}/run` — resolve every chart
/// against current dashboard data and return the per-chart values keyed by
/// chart id. Nothing is persisted; reports are always computed on demand.
#[tracing::instrument(skip(state))]
pub async fn run_report(
    State(state): State<Arc<AppState>>,
    Path((website_id, report_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_report(&state, &website_id, &report_id).await?;
    let metrics = resolve_metrics(&state, &report).await?;
    let data = renderer::generate_report_data(&report, &metrics);
    Ok(Json(json!({
        "data": {
            "report_id": report.id,
            "generated_at": Utc::now(),
            "charts": data,
        }
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<ReportFormat>,
}

/// `GET /api/websites/{id}/reports/{report_id}/export?format=csv|excel|json|pdf`
///
/// `csv` and `excel` both serve CSV bytes (spreadsheet apps open either);
/// `pdf` serves a print-ready HTML document. Default format is `csv`.
#[tracing::instrument(skip(state))]
pub async fn export_report(
    State(state): State<Arc<AppState>>,
    Path((website_id, report_id)): Path<(String, String)>,
    Query(q): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = load_report(&state, &website_id, &report_id).await?;
    let metrics = resolve_metrics(&state, &report).await?;
    let data = renderer::generate_report_data(&report, &metrics);

    let format = q.format.unwrap_or(ReportFormat::Csv);
    let (content_type, filename, bytes) =
        render_export(&report, &data, Utc::now(), format).map_err(AppError::Internal)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

async fn load_report(
    state: &AppState,
    website_id: &str,
    report_id: &str,
) -> Result<CustomReport, AppError> {
    state
        .reports
        .get(website_id, report_id)
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .ok_or_else(|| AppError::NotFound(format!("report {report_id}")))
}

/// Render a resolved report as downloadable bytes for `format`. `excel`
/// serves CSV (spreadsheet apps open it transparently) and `pdf` serves a
/// print-ready HTML document.
pub(crate) fn render_export(
    report: &CustomReport,
    data: &std::collections::BTreeMap<String, serde_json::Value>,
    generated_at: chrono::DateTime<Utc>,
    format: ReportFormat,
) -> anyhow::Result<(&'static str, String, Vec<u8>)> {
    Ok(match format {
        ReportFormat::Csv | ReportFormat::Excel => {
            ("text/csv", format!("{}.csv", report.id), renderer::to_csv(report, data)?)
        }
        ReportFormat::Json => {
            let value = renderer::to_json(report, data, generated_at);
            (
                "application/json",
                format!("{}.json", report.id),
                serde_json::to_vec_pretty(&value)?,
            )
        }
        ReportFormat::Pdf => (
            "text/html",
            format!("{}.html", report.id),
            renderer::to_document(report, data, generated_at).into_bytes(),
        ),
    })
}

/// Resolve the report's date range to dashboard metrics.
pub(crate) async fn resolve_metrics(
    state: &AppState,
    report: &CustomReport,
) -> Result<DashboardMetrics, AppError> {
    let (range, start, end) = match &report.date_range {
        ReportDateRange::Preset { range } => (*range, None, None),
        ReportDateRange::Explicit { start, end } => {
            (DashboardRange::Custom, Some(*start), Some(*end))
        }
    };
    state
        .dashboard
        .get_dashboard(&report.website_id, range, start, end, Utc::now())
        .await
        .map_err(AppError::Internal)
}
