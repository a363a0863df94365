//! Typed raw events, validated at the node-client boundary.
//!
//! A log that reaches the sync engine has already been decoded into the
//! stream's variant; loosely-typed field maps never cross this boundary.

use serde::{Deserialize, Serialize};

use crate::stream::Stream;

/// A decoded log event as delivered by the node client.
///
/// Ephemeral — enriched and turned into an [`crate::record::EventRecord`]
/// before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLogEvent {
    /// Block the log was emitted in.
    pub block_number: u64,
    /// Transaction hash (`0x…`).
    pub tx_hash: String,
    /// The stream-specific emitted fields.
    pub payload: EventPayload,
}

/// The emitted fields of each event kind.
///
/// Addresses are lower-cased `0x…` strings. Prices and fees are decimal
/// strings — token amounts routinely exceed `u64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    TokenTransfer {
        from: String,
        to: String,
        token_id: String,
    },
    OrderForAuction {
        seller: String,
        order_id: u64,
        token_id: String,
        quote_token: String,
        min_price: String,
        end_time: u64,
    },
    OrderForSale {
        seller: String,
        order_id: u64,
        token_id: String,
        price: String,
    },
    OrderBid {
        seller: String,
        buyer: String,
        order_id: u64,
        price: String,
    },
    OrderPriceChanged {
        seller: String,
        order_id: u64,
        old_price: String,
        new_price: String,
    },
    OrderFilled {
        seller: String,
        buyer: String,
        order_id: u64,
        quote_token: String,
        price: String,
        royalty_owner: String,
        royalty_fee: String,
        platform_address: String,
        platform_fee: String,
    },
    OrderCancelled {
        seller: String,
        order_id: u64,
    },
    OrderTakenDown {
        seller: String,
        order_id: u64,
    },
}

impl EventPayload {
    /// The stream this payload belongs to.
    pub fn stream(&self) -> Stream {
        match self {
            Self::TokenTransfer { .. } => Stream::TokenTransfer,
            Self::OrderForAuction { .. } => Stream::OrderForAuction,
            Self::OrderForSale { .. } => Stream::OrderForSale,
            Self::OrderBid { .. } => Stream::OrderBid,
            Self::OrderPriceChanged { .. } => Stream::OrderPriceChanged,
            Self::OrderFilled { .. } => Stream::OrderFilled,
            Self::OrderCancelled { .. } => Stream::OrderCancelled,
            Self::OrderTakenDown { .. } => Stream::OrderTakenDown,
        }
    }

    /// The order id, for the seven order-lifecycle payloads.
    pub fn order_id(&self) -> Option<u64> {
        match self {
            Self::TokenTransfer { .. } => None,
            Self::OrderForAuction { order_id, .. }
            | Self::OrderForSale { order_id, .. }
            | Self::OrderBid { order_id, .. }
            | Self::OrderPriceChanged { order_id, .. }
            | Self::OrderFilled { order_id, .. }
            | Self::OrderCancelled { order_id, .. }
            | Self::OrderTakenDown { order_id, .. } => Some(*order_id),
        }
    }
}
