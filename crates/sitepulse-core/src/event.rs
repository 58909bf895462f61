use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceInfo;
use crate::error::CoreError;

/// The payload the client sends to POST /api/track.
///
/// Only the six identity/classification fields are required; everything else
/// is optional and stored as-is. `event_type` and `event_category` are
/// free-form strings — the conventional categories are
/// `page|user|ecommerce|custom|performance|error`, but the pipeline must
/// tolerate arbitrary values end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPayload {
    #[serde(default)]
    pub website_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub event_action: Option<String>,
    pub event_label: Option<String>,
    pub event_value: Option<f64>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub location: Option<GeoLocation>,
    /// Free-form bag; `metadata.revenue` (numeric) is summed into conversion
    /// revenue during aggregation.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Client-supplied timestamps are not trusted; the server always assigns
    /// its own. Accepted on the wire so old SDKs don't fail deserialization.
    #[serde(default, skip_serializing)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Accepts either a single event or a `{website_id, events: [...]}` batch
/// at POST /api/track.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TrackOrBatch {
    Batch(TrackBatch),
    Single(Box<TrackPayload>),
}

#[derive(Debug, Deserialize)]
pub struct TrackBatch {
    pub website_id: String,
    pub events: Vec<TrackPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// The enriched, stored version of an event. Created once by the tracker,
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub website_id: String,
    pub session_id: String,
    pub visitor_id: String,
    pub event_type: String,
    pub event_category: String,
    pub event_action: String,
    pub event_label: Option<String>,
    pub event_value: Option<f64>,
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub device: DeviceInfo,
    pub location: Option<GeoLocation>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Validate a wire payload and enrich it into a stored event.
    ///
    /// Assigns a v4 uuid and the server-side timestamp, classifies the device
    /// from the payload's user-agent string. A missing required field fails
    /// only this entry, never the enclosing batch.
    pub fn from_payload(payload: TrackPayload, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let website_id = required(payload.website_id, "website_id")?;
        // The id becomes a directory name in every store; ids shaped like
        // paths must never get that far.
        if website_id == "." || website_id == ".." || website_id.contains(['/', '\\', '\0']) {
            return Err(CoreError::Validation(format!(
                "invalid website_id: {website_id}"
            )));
        }
        let session_id = required(payload.session_id, "session_id")?;
        let visitor_id = required(payload.visitor_id, "visitor_id")?;
        let event_type = required(payload.event_type, "event_type")?;
        let event_category = required(payload.event_category, "event_category")?;
        let event_action = required(payload.event_action, "event_action")?;

        let device = DeviceInfo::classify(payload.user_agent.as_deref().unwrap_or(""));

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            website_id,
            session_id,
            visitor_id,
            event_type,
            event_category,
            event_action,
            event_label: payload.event_label,
            event_value: payload.event_value,
            path: payload.path,
            referrer: payload.referrer,
            user_agent: payload.user_agent,
            ip: payload.ip,
            device,
            location: payload.location,
            metadata: payload.metadata,
            timestamp: now,
        })
    }

    /// A page-producing event has a non-empty `path` or is a `pageview`.
    /// Sessionization uses this to decide bounce status.
    pub fn is_page_producing(&self) -> bool {
        self.path.as_deref().is_some_and(|p| !p.is_empty()) || self.event_type == "pageview"
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, CoreError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CoreError::Validation(format!("missing field: {field}"))),
    }
}
