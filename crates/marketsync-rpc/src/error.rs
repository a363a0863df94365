//! Node-client error taxonomy.

use thiserror::Error;

use marketsync_core::Stream;

use crate::wire::RpcErrorObject;

/// Errors surfaced by the chain node client.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Connectivity loss, timeout, or transport failure — transient.
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    /// The node rejected a historical query as too wide; the caller must
    /// reduce the range.
    #[error("log range [{from}, {to}] too large")]
    RangeTooLarge { from: u64, to: u64 },

    /// One entry of a batch failed, failing the whole batch. There is no
    /// partial-batch recovery path; retry the whole batch.
    #[error("batch call failed: {0}")]
    BatchCallFailed(String),

    /// The live subscription's terminal error signal.
    #[error("subscription dropped: {0}")]
    SubscriptionDropped(String),

    /// A log that does not decode into its stream's payload. Skippable —
    /// never fails the stream.
    #[error("malformed {stream} event in tx {tx_hash}: {reason}")]
    MalformedEvent {
        stream: Stream,
        tx_hash: String,
        reason: String,
    },

    /// Protocol-level error object returned by the node.
    #[error("rpc error {}: {}", .0.code, .0.message)]
    Rpc(RpcErrorObject),

    /// A response that does not deserialize into the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl NodeError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NodeUnavailable(_) | Self::BatchCallFailed(_) | Self::SubscriptionDropped(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(NodeError::NodeUnavailable("refused".into()).is_retryable());
        assert!(NodeError::BatchCallFailed("entry 2".into()).is_retryable());
        assert!(!NodeError::RangeTooLarge { from: 1, to: 99_999 }.is_retryable());
        assert!(!NodeError::MalformedEvent {
            stream: Stream::OrderBid,
            tx_hash: "0x1".into(),
            reason: "short data".into(),
        }
        .is_retryable());
    }
}
