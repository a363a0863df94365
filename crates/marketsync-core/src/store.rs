//! The event-store contract — append-only records plus derived projections.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::record::EventRecord;
use crate::stream::Stream;

/// The two projected entities the pipeline maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Token,
    Order,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token => write!(f, "token"),
            Self::Order => write!(f, "order"),
        }
    }
}

/// Persistence for normalized event records and the derived projections.
///
/// Implementations include `MemoryEventStore` and `SqliteEventStore`
/// (marketsync-storage).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one record to its stream's collection. No dedup.
    async fn append(&self, record: EventRecord) -> Result<(), SyncError>;

    /// Highest block number among the stream's persisted records, or `None`
    /// if the collection is empty. Must be O(1) given a descending
    /// block-number index — it is consulted at every stream start and
    /// resubscribe.
    async fn last_block_number(&self, stream: Stream) -> Result<Option<u64>, SyncError>;

    /// Idempotent field-level upsert on a projection row. Last writer wins
    /// per field; writes for one key are serialized by the implementation.
    async fn apply_projection(
        &self,
        kind: EntityKind,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SyncError>;

    /// Row count of a projection; used only by the drift monitor.
    async fn aggregate_count(&self, kind: EntityKind) -> Result<u64, SyncError>;
}
