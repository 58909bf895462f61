use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — the tracking snippet is embedded on third-party sites,
///    so `/api/track` must answer cross-origin preflights. Origins come
///    from `SITEPULSE_CORS_ORIGINS`; an empty list means allow any.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/track", post(routes::track::track))
        .route(
            "/api/websites/{website_id}/dashboard",
            get(routes::dashboard::get_dashboard),
        )
        .route(
            "/api/websites/{website_id}/aggregate",
            post(routes::aggregate::aggregate),
        )
        .route(
            "/api/websites/{website_id}/reports",
            get(routes::reports::list_reports).post(routes::reports::create_report),
        )
        .route(
            "/api/websites/{website_id}/reports/{report_id}",
            get(routes::reports::get_report)
                .put(routes::reports::update_report)
                .delete(routes::reports::delete_report),
        )
        .route(
            "/api/websites/{website_id}/reports/{report_id}/run",
            post(routes::reports::run_report),
        )
        .route(
            "/api/websites/{website_id}/reports/{report_id}/export",
            get(routes::reports::export_report),
        )
        .route(
            "/api/websites/{website_id}/schedules",
            get(routes::schedules::list_schedules).post(routes::schedules::create_schedule),
        )
        .route(
            "/api/websites/{website_id}/schedules/{schedule_id}",
            get(routes::schedules::get_schedule)
                .put(routes::schedules::update_schedule)
                .delete(routes::schedules::delete_schedule),
        )
        .route(
            "/api/websites/{website_id}/schedules/process",
            post(routes::schedules::process_schedules),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();
    if parsed.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
