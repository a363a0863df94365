//! Per-event processing: enrich, persist, dispatch.
//!
//! Shared by backfill and live tail. Every event takes the same path:
//! one batched round trip for the transaction, the block, and (for the
//! streams that need it) a contract read; then the append; then the domain
//! effect.

use std::sync::Arc;

use serde_json::{Map, Value};

use marketsync_core::contract::{OrderInfo, OrderState};
use marketsync_core::event::{EventPayload, RawLogEvent};
use marketsync_core::record::EventRecord;
use marketsync_core::store::EventStore;
use marketsync_core::{DomainReactor, SyncError, BURN_ADDRESS};
use marketsync_rpc::{CallResult, NodeCall, NodeClient, RetryPolicy};

/// Processes one raw event end to end.
pub struct EventProcessor {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn EventStore>,
    reactor: Arc<dyn DomainReactor>,
    market_address: String,
    retry: RetryPolicy,
}

impl EventProcessor {
    pub fn new(
        client: Arc<dyn NodeClient>,
        store: Arc<dyn EventStore>,
        reactor: Arc<dyn DomainReactor>,
        market_address: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            reactor,
            market_address: market_address.into().to_lowercase(),
            retry: RetryPolicy::default(),
        }
    }

    /// Enrich, persist, and dispatch one event.
    ///
    /// A persistent append failure is fatal for the stream: the checkpoint
    /// derives from what was persisted, so skipping here would silently
    /// lose the block. Reactor failures only warn — the record is already
    /// durable and a re-run reprojects it.
    pub async fn process(&self, event: &RawLogEvent) -> Result<(), SyncError> {
        let stream = event.payload.stream();
        tracing::debug!(%stream, block = event.block_number, tx = %event.tx_hash, "processing event");

        let calls = Self::enrichment_calls(event);
        let results = self.batch_with_retry(&calls).await?;

        let (tx_info, block_info, extra) = match results.as_slice() {
            [CallResult::Transaction(tx), CallResult::Block(block), rest @ ..] => {
                (tx.clone(), *block, rest.first().cloned())
            }
            other => {
                return Err(SyncError::Node(format!(
                    "batch returned {} results out of shape",
                    other.len()
                )))
            }
        };

        let record =
            EventRecord::from_event(event, tx_info.gas_fee(), block_info.timestamp);
        self.append_with_retry(record).await?;

        if let Err(e) = self.dispatch(&event.payload, extra, block_info.timestamp).await {
            tracing::warn!(%stream, tx = %event.tx_hash, error = %e, "domain effect failed");
        }
        Ok(())
    }

    /// The batch for this event: transaction + block, plus the stream's
    /// contract read where the effect needs enriched state.
    fn enrichment_calls(event: &RawLogEvent) -> Vec<NodeCall> {
        let mut calls = vec![
            NodeCall::Transaction { tx_hash: event.tx_hash.clone() },
            NodeCall::Block { number: event.block_number },
        ];
        match &event.payload {
            EventPayload::TokenTransfer { token_id, .. } => {
                calls.push(NodeCall::TokenInfo { token_id: token_id.clone() });
            }
            EventPayload::OrderForAuction { order_id, .. }
            | EventPayload::OrderForSale { order_id, .. }
            | EventPayload::OrderBid { order_id, .. }
            | EventPayload::OrderFilled { order_id, .. } => {
                calls.push(NodeCall::OrderById { order_id: *order_id });
            }
            EventPayload::OrderPriceChanged { .. }
            | EventPayload::OrderCancelled { .. }
            | EventPayload::OrderTakenDown { .. } => {}
        }
        calls
    }

    /// Whole-batch retry — there is no partial-batch recovery path.
    async fn batch_with_retry(&self, calls: &[NodeCall]) -> Result<Vec<CallResult>, SyncError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.batch_call(calls).await {
                Ok(results) => return Ok(results),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, error = %e, "retrying enrichment batch");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(SyncError::Node(e.to_string())),
                },
                Err(e) => return Err(SyncError::Node(e.to_string())),
            }
        }
    }

    async fn append_with_retry(&self, record: EventRecord) -> Result<(), SyncError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.append(record.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, error = %e, "retrying append");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn dispatch(
        &self,
        payload: &EventPayload,
        extra: Option<CallResult>,
        timestamp: u64,
    ) -> Result<(), SyncError> {
        match payload {
            EventPayload::TokenTransfer { from, to, token_id } => {
                if from == BURN_ADDRESS {
                    let token = match extra {
                        Some(CallResult::Token(info)) => info,
                        other => {
                            return Err(SyncError::Reactor(format!(
                                "transfer enrichment missing token info: {other:?}"
                            )))
                        }
                    };
                    self.reactor.handle_new_token(token).await
                } else if to != &self.market_address {
                    self.reactor.update_token_owner(token_id, to).await
                } else {
                    // Escrow move into the marketplace; ownership unchanged.
                    Ok(())
                }
            }
            EventPayload::OrderForAuction { .. } | EventPayload::OrderForSale { .. } => {
                let order = Self::expect_order(extra)?;
                self.reactor.handle_new_order(order).await
            }
            EventPayload::OrderBid { order_id, .. } => {
                let order = Self::expect_order(extra)?;
                let mut fields = Self::order_settlement_fields(&order);
                fields.insert("bids".into(), Value::from(order.bids));
                fields.insert("lastBid".into(), Value::String(order.last_bid.clone()));
                fields.insert("lastBidder".into(), Value::String(order.last_bidder.clone()));
                self.reactor.update_order(*order_id, fields).await
            }
            EventPayload::OrderFilled { order_id, .. } => {
                let order = Self::expect_order(extra)?;
                let fields = Self::order_settlement_fields(&order);
                self.reactor.update_order(*order_id, fields).await
            }
            EventPayload::OrderPriceChanged { order_id, new_price, .. } => {
                let mut fields = Map::new();
                fields.insert("price".into(), Value::String(new_price.clone()));
                fields.insert("updateTime".into(), Value::from(timestamp));
                self.reactor.update_order(*order_id, fields).await
            }
            EventPayload::OrderCancelled { order_id, .. } => {
                self.reactor
                    .update_order(*order_id, Self::state_fields(OrderState::Cancelled, timestamp))
                    .await
            }
            EventPayload::OrderTakenDown { order_id, .. } => {
                self.reactor
                    .update_order(*order_id, Self::state_fields(OrderState::TakenDown, timestamp))
                    .await
            }
        }
    }

    fn expect_order(extra: Option<CallResult>) -> Result<OrderInfo, SyncError> {
        match extra {
            Some(CallResult::Order(info)) => Ok(info),
            other => Err(SyncError::Reactor(format!(
                "order enrichment missing order info: {other:?}"
            ))),
        }
    }

    /// The settlement-relevant slice of an order read, shared by bid and
    /// fill effects.
    fn order_settlement_fields(order: &OrderInfo) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "orderState".into(),
            serde_json::to_value(order.order_state).unwrap_or(Value::Null),
        );
        fields.insert("buyerAddr".into(), Value::String(order.buyer_addr.clone()));
        fields.insert("buyerUri".into(), Value::String(order.buyer_uri.clone()));
        fields.insert("filled".into(), Value::String(order.filled.clone()));
        fields.insert("platformAddr".into(), Value::String(order.platform_addr.clone()));
        fields.insert("platformFee".into(), Value::String(order.platform_fee.clone()));
        fields.insert("updateTime".into(), Value::from(order.update_time));
        fields
    }

    fn state_fields(state: OrderState, timestamp: u64) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "orderState".into(),
            serde_json::to_value(state).unwrap_or(Value::Null),
        );
        fields.insert("updateTime".into(), Value::from(timestamp));
        fields
    }
}
