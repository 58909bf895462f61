//! Background delivery of scheduled reports.
//!
//! A fixed-interval tick walks every website with a schedule collection,
//! renders each due item's report and emails it. Success advances
//! `last_sent`/`next_send`; failure leaves the item due so the next tick
//! retries it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use sitepulse_core::schedule::{compute_next_send, ScheduledReport};
use sitepulse_engine::renderer;

use crate::routes::reports::{render_export, resolve_metrics};
use crate::state::AppState;

pub mod delivery;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ProcessOutcome {
    pub sent: usize,
    pub errors: usize,
}

pub async fn run_scheduler_loop(state: Arc<AppState>) {
    let tick = state.config.scheduler_tick_seconds;
    info!(tick_seconds = tick, "report scheduler started");
    let mut interval = tokio::time::interval(Duration::from_secs(tick));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        process_once(&state, Utc::now()).await;
    }
}

/// One pass over every website that has schedules.
pub async fn process_once(state: &AppState, now: DateTime<Utc>) -> ProcessOutcome {
    let mut total = ProcessOutcome::default();
    for website_id in state.schedules.websites() {
        if let Some(outcome) = process_website(state, &website_id, now).await {
            total.sent += outcome.sent;
            total.errors += outcome.errors;
        }
    }
    total
}

/// Deliver every due item for one website. Returns `None` when a pass for
/// this website is already in flight (overlapping ticks, or a manual
/// process request racing the background loop).
pub async fn process_website(
    state: &AppState,
    website_id: &str,
    now: DateTime<Utc>,
) -> Option<ProcessOutcome> {
    if !state.begin_processing(website_id).await {
        return None;
    }
    let outcome = process_due(state, website_id, now).await;
    state.end_processing(website_id).await;
    Some(outcome)
}

async fn process_due(state: &AppState, website_id: &str, now: DateTime<Utc>) -> ProcessOutcome {
    let mut outcome = ProcessOutcome::default();
    let due = match state.schedules.list_due(website_id, now).await {
        Ok(due) => due,
        Err(err) => {
            error!(website_id, error = %err, "failed to load due schedules");
            outcome.errors += 1;
            return outcome;
        }
    };

    for item in due {
        // A rule that cannot produce a next instant is a dead item, not a
        // retry loop: skip it as disabled instead of emailing forever.
        let next_send = match compute_next_send(&item.schedule, now) {
            Ok(next_send) => next_send,
            Err(err) => {
                warn!(
                    website_id,
                    schedule_id = %item.id,
                    error = %err,
                    "recurrence rule is not computable, skipping item as disabled"
                );
                continue;
            }
        };
        match fire(state, &item, now, next_send).await {
            Ok(()) => outcome.sent += 1,
            Err(err) => {
                // Delivery failure does not advance next_send: the item
                // stays due and the next tick retries it.
                warn!(
                    website_id,
                    schedule_id = %item.id,
                    report_id = %item.report_id,
                    error = %err,
                    "scheduled report delivery failed"
                );
                outcome.errors += 1;
            }
        }
    }
    outcome
}

async fn fire(
    state: &AppState,
    item: &ScheduledReport,
    now: DateTime<Utc>,
    next_send: DateTime<Utc>,
) -> anyhow::Result<()> {
    let report = state
        .reports
        .get(&item.website_id, &item.report_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("report {} no longer exists", item.report_id))?;

    let metrics = resolve_metrics(state, &report)
        .await
        .map_err(|e| anyhow::anyhow!("report resolution failed: {e}"))?;
    let data = renderer::generate_report_data(&report, &metrics);
    let (content_type, filename, bytes) = render_export(&report, &data, now, item.format)?;

    let subject = format!("Scheduled report: {}", report.name);
    let body = format!(
        "Your scheduled report \"{}\" is attached.\nGenerated at {}.",
        report.name,
        now.to_rfc3339()
    );
    delivery::deliver_email(
        &item.recipients,
        &subject,
        &body,
        &filename,
        content_type,
        &bytes,
    )
    .await
    .map_err(|e| anyhow::anyhow!(e))?;

    state
        .schedules
        .record_fire(&item.website_id, &item.id, now, next_send)
        .await?;
    info!(
        website_id = %item.website_id,
        schedule_id = %item.id,
        report_id = %item.report_id,
        next_send = %next_send,
        "scheduled report delivered"
    );
    Ok(())
}
