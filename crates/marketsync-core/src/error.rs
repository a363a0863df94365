//! Error types shared across the sync pipeline.

use thiserror::Error;

/// Errors that can occur while synchronizing a stream.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("node error: {0}")]
    Node(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("reactor error: {0}")]
    Reactor(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("stream aborted: {reason}")]
    Aborted { reason: String },
}

impl SyncError {
    /// Returns `true` if the error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Node(_) | Self::Persistence(_))
    }
}
