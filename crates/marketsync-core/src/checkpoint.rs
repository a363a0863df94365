//! Checkpoint resolution — where a stream left off.
//!
//! There is no separately stored checkpoint. The resume height is derived
//! from the data itself: the maximum block number among a stream's persisted
//! records, falling back to the source contract's deployment height when the
//! collection is empty. Derivation cannot diverge from the data, but it also
//! means an event that was enriched and never appended leaves no trace.

use std::sync::Arc;

use crate::error::SyncError;
use crate::store::EventStore;
use crate::stream::{SourceContract, Stream};

/// Resolves the last synchronized block height for a stream.
pub struct CheckpointResolver {
    store: Arc<dyn EventStore>,
    token_deploy_height: u64,
    market_deploy_height: u64,
}

impl CheckpointResolver {
    pub fn new(
        store: Arc<dyn EventStore>,
        token_deploy_height: u64,
        market_deploy_height: u64,
    ) -> Self {
        Self {
            store,
            token_deploy_height,
            market_deploy_height,
        }
    }

    /// Last block height covered by persisted records of `stream`, or the
    /// deployment height of the stream's source contract if none exist.
    pub async fn last_height(&self, stream: Stream) -> Result<u64, SyncError> {
        match self.store.last_block_number(stream).await? {
            Some(height) => Ok(height),
            None => Ok(match stream.source() {
                SourceContract::Token => self.token_deploy_height,
                SourceContract::Market => self.market_deploy_height,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::record::EventRecord;
    use crate::store::EntityKind;

    #[derive(Default)]
    struct FixedHeights {
        heights: Mutex<HashMap<Stream, u64>>,
    }

    #[async_trait]
    impl EventStore for FixedHeights {
        async fn append(&self, record: EventRecord) -> Result<(), SyncError> {
            self.heights
                .lock()
                .unwrap()
                .insert(record.stream(), record.block_number());
            Ok(())
        }

        async fn last_block_number(&self, stream: Stream) -> Result<Option<u64>, SyncError> {
            Ok(self.heights.lock().unwrap().get(&stream).copied())
        }

        async fn apply_projection(
            &self,
            _kind: EntityKind,
            _key: &str,
            _fields: Map<String, Value>,
        ) -> Result<(), SyncError> {
            Ok(())
        }

        async fn aggregate_count(&self, _kind: EntityKind) -> Result<u64, SyncError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn empty_stream_falls_back_to_deploy_height() {
        let resolver = CheckpointResolver::new(Arc::new(FixedHeights::default()), 500, 900);

        let token = resolver.last_height(Stream::TokenTransfer).await.unwrap();
        assert_eq!(token, 500);

        let market = resolver.last_height(Stream::OrderFilled).await.unwrap();
        assert_eq!(market, 900);
    }

    #[tokio::test]
    async fn persisted_height_wins_over_fallback() {
        let store = Arc::new(FixedHeights::default());
        store.heights.lock().unwrap().insert(Stream::OrderBid, 12_345);

        let resolver = CheckpointResolver::new(store, 500, 900);
        assert_eq!(resolver.last_height(Stream::OrderBid).await.unwrap(), 12_345);
        // Other market streams still fall back
        assert_eq!(resolver.last_height(Stream::OrderForSale).await.unwrap(), 900);
    }
}
