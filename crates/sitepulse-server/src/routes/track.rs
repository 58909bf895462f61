use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use sitepulse_core::event::{Event, TrackOrBatch, TrackPayload};

use crate::{error::AppError, state::AppState};

/// `POST /api/track` — ingest a single event or a `{website_id, events}`
/// batch.
///
/// Required fields per entry: `website_id`, `session_id`, `visitor_id`,
/// `event_type`, `event_category`, `event_action`. A malformed entry is
/// skipped and counted; it never aborts the batch. The server assigns each
/// stored event a fresh id and its own timestamp (client timestamps are not
/// trusted) and classifies the device from the payload's user-agent string.
///
/// Responds `202 Accepted` with `{ "data": { "saved": n, "errors": m } }`.
#[tracing::instrument(skip(state, payload))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrackOrBatch>,
) -> Result<impl IntoResponse, AppError> {
    let payloads: Vec<TrackPayload> = match payload {
        TrackOrBatch::Single(p) => vec![*p],
        TrackOrBatch::Batch(batch) => {
            let website_id = batch.website_id;
            batch
                .events
                .into_iter()
                .map(|mut p| {
                    // The batch wrapper's website_id fills entries that omit
                    // their own; an explicit per-entry value wins.
                    if p.website_id.is_none() {
                        p.website_id = Some(website_id.clone());
                    }
                    p
                })
                .collect()
        }
    };

    let now = Utc::now();
    let mut errors = 0usize;
    // Group valid events per website so each partition is written once.
    let mut per_website: HashMap<String, Vec<Event>> = HashMap::new();

    for payload in payloads {
        match Event::from_payload(payload, now) {
            Ok(event) => per_website
                .entry(event.website_id.clone())
                .or_default()
                .push(event),
            Err(err) => {
                warn!(error = %err, "rejected malformed track payload");
                errors += 1;
            }
        }
    }

    let date = now.date_naive();
    let mut saved = 0usize;
    for (website_id, events) in per_website {
        saved += events.len();
        state
            .events
            .append_many(&website_id, date, events)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "data": { "saved": saved, "errors": errors } })),
    ))
}
