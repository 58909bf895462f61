//! End-to-end flow: ingest events over HTTP, trigger aggregation, then read
//! the dashboard and check the derived figures.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use sitepulse_core::config::Config;
use sitepulse_server::app::build_app;
use sitepulse_server::state::AppState;

fn test_config(name: &str) -> Config {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("unix time")
        .as_nanos();
    Config {
        data_dir: std::env::temp_dir()
            .join(format!("sitepulse-dash-{name}-{nanos}"))
            .to_string_lossy()
            .to_string(),
        ..Config::default()
    }
}

fn setup(name: &str) -> axum::Router {
    let state = Arc::new(AppState::new(test_config(name)));
    build_app(state)
}

async fn request(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn event(session: &str, visitor: &str, event_type: &str, path: Option<&str>, value: Option<f64>) -> Value {
    json!({
        "session_id": session,
        "visitor_id": visitor,
        "event_type": event_type,
        "event_category": if event_type == "conversion" { "ecommerce" } else { "page" },
        "event_action": if event_type == "conversion" { "purchase" } else { "view" },
        "path": path,
        "event_value": value,
        "user_agent": "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0",
        "referrer": "https://google.com/search"
    })
}

/// Four sessions: one single-pageview bounce, two plain multi-page visits,
/// one visit that converts.
fn scenario_events() -> Vec<Value> {
    let mut events = vec![event("s1", "v1", "pageview", Some("/landing"), None)];
    for path in ["/home", "/pricing", "/docs"] {
        events.push(event("s2", "v2", "pageview", Some(path), None));
    }
    for path in ["/home", "/pricing"] {
        events.push(event("s3", "v3", "pageview", Some(path), None));
        events.push(event("s4", "v4", "pageview", Some(path), None));
    }
    events.push(event("s3", "v3", "conversion", None, Some(49.0)));
    events
}

#[tokio::test]
async fn ingest_aggregate_dashboard_round_trip() {
    let app = setup("roundtrip");

    let (status, body) = request(
        &app,
        "POST",
        "/api/track",
        Some(json!({ "website_id": "site-a", "events": scenario_events() })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["saved"], 9);

    let today = chrono::Utc::now().date_naive().to_string();
    let (status, body) = request(
        &app,
        "POST",
        "/api/websites/site-a/aggregate",
        Some(json!({ "date": today })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["visitors"]["unique"], 4);
    assert_eq!(body["data"]["sessions"]["total"], 4);
    assert_eq!(body["data"]["sessions"]["bounce_rate"], 25.0);
    assert_eq!(body["data"]["pageviews"]["total"], 8);
    assert_eq!(body["data"]["conversions"]["total"], 1);
    assert_eq!(body["data"]["conversions"]["revenue"], 49.0);

    let (status, body) = request(
        &app,
        "GET",
        "/api/websites/site-a/dashboard?range=7d",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["visitors"]["total"], 4.0);
    assert_eq!(data["pageviews"]["total"], 8.0);
    assert_eq!(data["bounce_rate"]["total"], 25.0);
    // Previous window has no data at all.
    assert_eq!(data["visitors"]["previous"], 0.0);
    assert_eq!(data["visitors"]["change"], 100.0);
    // All events were just ingested, so they fall inside the live window.
    assert_eq!(data["realtime"]["active_visitors"], 4);
    assert_eq!(data["realtime"]["current_pageviews"], 8);
    // The referrer classifies as Google for every session.
    assert_eq!(data["traffic_sources"][0]["key"], "Google");
}

#[tokio::test]
async fn aggregation_is_idempotent() {
    let app = setup("idempotent");
    request(
        &app,
        "POST",
        "/api/track",
        Some(json!({ "website_id": "site-a", "events": scenario_events() })),
    )
    .await;

    let today = chrono::Utc::now().date_naive().to_string();
    let (_, first) = request(
        &app,
        "POST",
        "/api/websites/site-a/aggregate",
        Some(json!({ "date": today })),
    )
    .await;
    let (_, second) = request(
        &app,
        "POST",
        "/api/websites/site-a/aggregate",
        Some(json!({ "date": today })),
    )
    .await;

    // Everything except the generation timestamp must be identical.
    let mut first = first["data"].clone();
    let mut second = second["data"].clone();
    first.as_object_mut().expect("object").remove("generated_at");
    second.as_object_mut().expect("object").remove("generated_at");
    assert_eq!(first, second);
}

#[tokio::test]
async fn batch_aggregation_reports_day_count() {
    let app = setup("batchagg");
    let today = chrono::Utc::now().date_naive();
    let start = today - chrono::Duration::days(2);
    let (status, body) = request(
        &app,
        "POST",
        "/api/websites/site-a/aggregate",
        Some(json!({ "start_date": start.to_string(), "end_date": today.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["aggregated"], 3);
    assert_eq!(body["data"]["errors"], 0);
}

#[tokio::test]
async fn invalid_range_is_rejected() {
    let app = setup("badrange");
    let (status, body) = request(
        &app,
        "GET",
        "/api/websites/site-a/dashboard?range=14d",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn aggregate_requires_date_or_range() {
    let app = setup("norange");
    let (status, body) = request(
        &app,
        "POST",
        "/api/websites/site-a/aggregate",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}
