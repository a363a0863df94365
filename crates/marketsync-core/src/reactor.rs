//! The domain reactor seam — where normalized commands leave the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::contract::{OrderInfo, TokenInfo};
use crate::error::SyncError;
use crate::store::{EntityKind, EventStore};

/// Consumes the domain commands the sync engine emits.
///
/// The engine never applies business rules itself; it normalizes and hands
/// off. [`ProjectionReactor`] is the stock implementation.
#[async_trait]
pub trait DomainReactor: Send + Sync {
    /// A token was minted (transfer from the burn address).
    async fn handle_new_token(&self, token: TokenInfo) -> Result<(), SyncError>;

    /// An order was opened (for sale or for auction).
    async fn handle_new_order(&self, order: OrderInfo) -> Result<(), SyncError>;

    /// Partial update of an order projection; `fields` holds only the
    /// fields that changed.
    async fn update_order(&self, order_id: u64, fields: Map<String, Value>)
        -> Result<(), SyncError>;

    /// Token changed hands outside the marketplace escrow.
    async fn update_token_owner(&self, token_id: &str, new_owner: &str) -> Result<(), SyncError>;
}

/// Reactor that materializes commands as projection upserts on the store.
pub struct ProjectionReactor {
    store: Arc<dyn EventStore>,
}

impl ProjectionReactor {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    fn to_fields<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>, SyncError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(SyncError::Reactor(format!(
                "expected object fields, got {other}"
            ))),
            Err(e) => Err(SyncError::Reactor(e.to_string())),
        }
    }
}

#[async_trait]
impl DomainReactor for ProjectionReactor {
    async fn handle_new_token(&self, token: TokenInfo) -> Result<(), SyncError> {
        let key = token.token_id.clone();
        let fields = Self::to_fields(&token)?;
        tracing::debug!(token_id = %key, "projecting new token");
        self.store.apply_projection(EntityKind::Token, &key, fields).await
    }

    async fn handle_new_order(&self, order: OrderInfo) -> Result<(), SyncError> {
        let key = order.order_id.to_string();
        let fields = Self::to_fields(&order)?;
        tracing::debug!(order_id = %key, "projecting new order");
        self.store.apply_projection(EntityKind::Order, &key, fields).await
    }

    async fn update_order(
        &self,
        order_id: u64,
        fields: Map<String, Value>,
    ) -> Result<(), SyncError> {
        self.store
            .apply_projection(EntityKind::Order, &order_id.to_string(), fields)
            .await
    }

    async fn update_token_owner(&self, token_id: &str, new_owner: &str) -> Result<(), SyncError> {
        let mut fields = Map::new();
        fields.insert("tokenOwner".into(), Value::String(new_owner.to_string()));
        self.store.apply_projection(EntityKind::Token, token_id, fields).await
    }
}
