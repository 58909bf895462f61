use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A tracked event is missing one of the six required fields. Per-entry:
    /// the batch continues and the entry is counted as an error.
    #[error("validation error: {0}")]
    Validation(String),

    /// A recurrence rule cannot produce a next fire time. The scheduler
    /// treats the owning item as disabled rather than crashing the tick.
    #[error("schedule computation error: {0}")]
    Schedule(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
