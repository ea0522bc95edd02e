use thiserror::Error;

/// Failures surfaced by the sync core. None of them ends a session.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Fetch rejected, timed out, or answered with a non-2xx status.
    #[error("network failure: {0}")]
    Network(String),
    /// Body could not be parsed or violated an id invariant.
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    /// Approve/reject not accepted by the server.
    #[error("{action} of join request {id} failed: {reason}")]
    Action {
        action: &'static str,
        id: crate::models::EntityId,
        reason: String,
    },
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Malformed(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}
