//! Periodic drift check: local aggregate counts vs the remote contract
//! counters. Logs only — it never corrects, never mutates, and never lets
//! an error escape.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use marketsync_core::store::{EntityKind, EventStore};
use marketsync_rpc::{CallResult, NodeCall, NodeClient};

/// Compares local and remote counts every `interval`.
pub struct DriftMonitor {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn EventStore>,
    interval: Duration,
}

impl DriftMonitor {
    pub fn new(client: Arc<dyn NodeClient>, store: Arc<dyn EventStore>, interval: Duration) -> Self {
        Self { client, store, interval }
    }

    /// Run until shutdown.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                    continue;
                }
            }
            self.check_once().await;
        }
    }

    /// One comparison pass. Infallible by contract: every failure path logs
    /// and returns.
    pub async fn check_once(&self) {
        let local_orders = match self.store.aggregate_count(EntityKind::Order).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "drift check: local order count unavailable");
                return;
            }
        };
        let local_tokens = match self.store.aggregate_count(EntityKind::Token).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "drift check: local token count unavailable");
                return;
            }
        };

        let remote = match self
            .client
            .batch_call(&[NodeCall::OrderCount, NodeCall::TotalSupply])
            .await
        {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "drift check: remote counters unavailable");
                return;
            }
        };
        let (remote_orders, remote_tokens) = match remote.as_slice() {
            [CallResult::Count(orders), CallResult::Count(tokens)] => (*orders, *tokens),
            other => {
                tracing::warn!(?other, "drift check: unexpected counter shapes");
                return;
            }
        };

        tracing::info!(local_orders, remote_orders, "order count check");
        tracing::info!(local_tokens, remote_tokens, "token count check");
        if local_orders != remote_orders || local_tokens != remote_tokens {
            tracing::warn!(
                order_drift = remote_orders as i64 - local_orders as i64,
                token_drift = remote_tokens as i64 - local_tokens as i64,
                "local counts drift from chain"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use marketsync_core::event::RawLogEvent;
    use marketsync_core::record::EventRecord;
    use marketsync_core::stream::Stream;
    use marketsync_core::SyncError;
    use marketsync_rpc::{LiveEvents, NodeError};
    use serde_json::{Map, Value};

    struct FailingStore;

    #[async_trait]
    impl EventStore for FailingStore {
        async fn append(&self, _record: EventRecord) -> Result<(), SyncError> {
            Err(SyncError::Persistence("down".into()))
        }
        async fn last_block_number(&self, _stream: Stream) -> Result<Option<u64>, SyncError> {
            Err(SyncError::Persistence("down".into()))
        }
        async fn apply_projection(
            &self,
            _kind: EntityKind,
            _key: &str,
            _fields: Map<String, Value>,
        ) -> Result<(), SyncError> {
            Err(SyncError::Persistence("down".into()))
        }
        async fn aggregate_count(&self, _kind: EntityKind) -> Result<u64, SyncError> {
            Err(SyncError::Persistence("down".into()))
        }
    }

    struct CountingStore(u64, u64);

    #[async_trait]
    impl EventStore for CountingStore {
        async fn append(&self, _record: EventRecord) -> Result<(), SyncError> {
            Ok(())
        }
        async fn last_block_number(&self, _stream: Stream) -> Result<Option<u64>, SyncError> {
            Ok(None)
        }
        async fn apply_projection(
            &self,
            _kind: EntityKind,
            _key: &str,
            _fields: Map<String, Value>,
        ) -> Result<(), SyncError> {
            Ok(())
        }
        async fn aggregate_count(&self, kind: EntityKind) -> Result<u64, SyncError> {
            Ok(match kind {
                EntityKind::Token => self.0,
                EntityKind::Order => self.1,
            })
        }
    }

    struct UnreachableNode;

    #[async_trait]
    impl NodeClient for UnreachableNode {
        async fn current_height(&self) -> Result<u64, NodeError> {
            Err(NodeError::NodeUnavailable("offline".into()))
        }
        async fn historical_events(
            &self,
            _stream: Stream,
            _from: u64,
            _to: u64,
        ) -> Result<Vec<RawLogEvent>, NodeError> {
            Err(NodeError::NodeUnavailable("offline".into()))
        }
        async fn subscribe_live(
            &self,
            _stream: Stream,
            _from: u64,
        ) -> Result<LiveEvents, NodeError> {
            Err(NodeError::NodeUnavailable("offline".into()))
        }
        async fn batch_call(&self, _calls: &[NodeCall]) -> Result<Vec<CallResult>, NodeError> {
            Err(NodeError::NodeUnavailable("offline".into()))
        }
    }

    struct FixedCounters(u64, u64);

    #[async_trait]
    impl NodeClient for FixedCounters {
        async fn current_height(&self) -> Result<u64, NodeError> {
            Ok(0)
        }
        async fn historical_events(
            &self,
            _stream: Stream,
            _from: u64,
            _to: u64,
        ) -> Result<Vec<RawLogEvent>, NodeError> {
            Ok(vec![])
        }
        async fn subscribe_live(
            &self,
            _stream: Stream,
            _from: u64,
        ) -> Result<LiveEvents, NodeError> {
            Err(NodeError::NodeUnavailable("no ws".into()))
        }
        async fn batch_call(&self, _calls: &[NodeCall]) -> Result<Vec<CallResult>, NodeError> {
            Ok(vec![CallResult::Count(self.1), CallResult::Count(self.0)])
        }
    }

    #[tokio::test]
    async fn check_never_propagates_store_failure() {
        let monitor = DriftMonitor::new(
            Arc::new(FixedCounters(5, 3)),
            Arc::new(FailingStore),
            Duration::from_secs(60),
        );
        monitor.check_once().await; // must not panic or return an error
    }

    #[tokio::test]
    async fn check_never_propagates_node_failure() {
        let monitor = DriftMonitor::new(
            Arc::new(UnreachableNode),
            Arc::new(CountingStore(5, 3)),
            Duration::from_secs(60),
        );
        monitor.check_once().await;
    }

    #[tokio::test]
    async fn mismatched_counts_only_log() {
        let monitor = DriftMonitor::new(
            Arc::new(FixedCounters(10, 9)),
            Arc::new(CountingStore(5, 3)),
            Duration::from_secs(60),
        );
        monitor.check_once().await; // drift is reported via logs, state untouched
    }
}
