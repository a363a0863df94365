//! In-memory event store.
//!
//! All data is lost when the process exits. The collection layout mirrors
//! the durable backend: two dedicated collections plus the shared
//! order-events collection with its `event_type` discriminator.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use marketsync_core::record::{BidEventRecord, EventRecord, OrderEventRecord, TokenEventRecord};
use marketsync_core::store::{EntityKind, EventStore};
use marketsync_core::stream::Stream;
use marketsync_core::SyncError;

/// In-memory `EventStore`.
#[derive(Default)]
pub struct MemoryEventStore {
    token_events: Mutex<Vec<TokenEventRecord>>,
    order_events: Mutex<Vec<OrderEventRecord>>,
    bid_events: Mutex<Vec<BidEventRecord>>,
    tokens: Mutex<BTreeMap<String, Map<String, Value>>>,
    orders: Mutex<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted token transfers, in append order.
    pub fn token_events(&self) -> Vec<TokenEventRecord> {
        self.token_events.lock().unwrap().clone()
    }

    /// All persisted order events of one stream.
    pub fn order_events_for(&self, stream: Stream) -> Vec<OrderEventRecord> {
        self.order_events
            .lock()
            .unwrap()
            .iter()
            .filter(|rec| rec.event_type.stream() == stream)
            .cloned()
            .collect()
    }

    /// All persisted bids, in append order.
    pub fn bid_events(&self) -> Vec<BidEventRecord> {
        self.bid_events.lock().unwrap().clone()
    }

    /// Total records across all collections.
    pub fn record_count(&self) -> usize {
        self.token_events.lock().unwrap().len()
            + self.order_events.lock().unwrap().len()
            + self.bid_events.lock().unwrap().len()
    }

    /// A projection row, if it exists.
    pub fn projection(&self, kind: EntityKind, key: &str) -> Option<Map<String, Value>> {
        self.projections(kind).lock().unwrap().get(key).cloned()
    }

    fn projections(&self, kind: EntityKind) -> &Mutex<BTreeMap<String, Map<String, Value>>> {
        match kind {
            EntityKind::Token => &self.tokens,
            EntityKind::Order => &self.orders,
        }
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, record: EventRecord) -> Result<(), SyncError> {
        match record {
            EventRecord::Token(rec) => self.token_events.lock().unwrap().push(rec),
            EventRecord::Order(rec) => self.order_events.lock().unwrap().push(rec),
            EventRecord::Bid(rec) => self.bid_events.lock().unwrap().push(rec),
        }
        Ok(())
    }

    async fn last_block_number(&self, stream: Stream) -> Result<Option<u64>, SyncError> {
        let max = match stream {
            Stream::TokenTransfer => self
                .token_events
                .lock()
                .unwrap()
                .iter()
                .map(|rec| rec.block_number)
                .max(),
            Stream::OrderBid => self
                .bid_events
                .lock()
                .unwrap()
                .iter()
                .map(|rec| rec.block_number)
                .max(),
            other => self
                .order_events
                .lock()
                .unwrap()
                .iter()
                .filter(|rec| rec.event_type.stream() == other)
                .map(|rec| rec.block_number)
                .max(),
        };
        Ok(max)
    }

    async fn apply_projection(
        &self,
        kind: EntityKind,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SyncError> {
        // The row is merged under the collection lock, so concurrent
        // writers to one key serialize; last writer wins per field.
        let mut rows = self.projections(kind).lock().unwrap();
        let row = rows.entry(key.to_string()).or_default();
        for (field, value) in fields {
            row.insert(field, value);
        }
        Ok(())
    }

    async fn aggregate_count(&self, kind: EntityKind) -> Result<u64, SyncError> {
        Ok(self.projections(kind).lock().unwrap().len() as u64)
    }
}
