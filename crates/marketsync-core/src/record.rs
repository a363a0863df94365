//! Persisted, append-only event records.
//!
//! Three collections: `token_events` and `bid_order_events` hold one stream
//! each; `order_events` is shared by the six order-lifecycle streams and
//! discriminated by [`OrderEventType`]. No uniqueness constraint — a retried
//! enrichment may append the same (stream, tx) twice, and readers tolerate it.

use serde::{Deserialize, Serialize};

use crate::event::{EventPayload, RawLogEvent};
use crate::stream::Stream;

/// Discriminator for records sharing the order-events collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEventType {
    OrderForAuction,
    OrderForSale,
    OrderPriceChanged,
    OrderFilled,
    OrderCancelled,
    OrderTakenDown,
}

impl OrderEventType {
    pub fn stream(self) -> Stream {
        match self {
            Self::OrderForAuction => Stream::OrderForAuction,
            Self::OrderForSale => Stream::OrderForSale,
            Self::OrderPriceChanged => Stream::OrderPriceChanged,
            Self::OrderFilled => Stream::OrderFilled,
            Self::OrderCancelled => Stream::OrderCancelled,
            Self::OrderTakenDown => Stream::OrderTakenDown,
        }
    }
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stream())
    }
}

/// A persisted token transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEventRecord {
    pub block_number: u64,
    pub transaction_hash: String,
    pub from: String,
    pub to: String,
    pub token_id: String,
    /// Transaction cost in the ledger's base unit: gas × gasPrice / 10¹⁸.
    pub gas_fee: f64,
    /// Block time, seconds since epoch.
    pub timestamp: u64,
}

/// A persisted order-lifecycle event (all six kinds share this shape).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEventRecord {
    pub block_number: u64,
    pub transaction_hash: String,
    pub event_type: OrderEventType,
    pub seller: String,
    pub order_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub royalty_owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub royalty_fee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_fee: Option<String>,
    pub gas_fee: f64,
    pub timestamp: u64,
}

impl OrderEventRecord {
    /// A record carrying only the fields every order event has; per-kind
    /// extras are filled in by the builder below.
    fn base(
        event_type: OrderEventType,
        block_number: u64,
        transaction_hash: String,
        seller: String,
        order_id: u64,
        gas_fee: f64,
        timestamp: u64,
    ) -> Self {
        Self {
            block_number,
            transaction_hash,
            event_type,
            seller,
            order_id,
            token_id: None,
            quote_token: None,
            price: None,
            min_price: None,
            end_time: None,
            old_price: None,
            new_price: None,
            buyer: None,
            royalty_owner: None,
            royalty_fee: None,
            platform_address: None,
            platform_fee: None,
            gas_fee,
            timestamp,
        }
    }
}

/// A persisted bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidEventRecord {
    pub block_number: u64,
    pub transaction_hash: String,
    pub seller: String,
    pub buyer: String,
    pub order_id: u64,
    pub price: String,
    pub gas_fee: f64,
    pub timestamp: u64,
}

/// The record appended for one processed event, routed by collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventRecord {
    Token(TokenEventRecord),
    Order(OrderEventRecord),
    Bid(BidEventRecord),
}

impl EventRecord {
    /// Normalize a raw event into its persisted shape.
    pub fn from_event(event: &RawLogEvent, gas_fee: f64, timestamp: u64) -> Self {
        let block_number = event.block_number;
        let tx = event.tx_hash.clone();
        match &event.payload {
            EventPayload::TokenTransfer { from, to, token_id } => Self::Token(TokenEventRecord {
                block_number,
                transaction_hash: tx,
                from: from.clone(),
                to: to.clone(),
                token_id: token_id.clone(),
                gas_fee,
                timestamp,
            }),
            EventPayload::OrderBid { seller, buyer, order_id, price } => Self::Bid(BidEventRecord {
                block_number,
                transaction_hash: tx,
                seller: seller.clone(),
                buyer: buyer.clone(),
                order_id: *order_id,
                price: price.clone(),
                gas_fee,
                timestamp,
            }),
            EventPayload::OrderForAuction {
                seller,
                order_id,
                token_id,
                quote_token,
                min_price,
                end_time,
            } => {
                let mut rec = OrderEventRecord::base(
                    OrderEventType::OrderForAuction,
                    block_number,
                    tx,
                    seller.clone(),
                    *order_id,
                    gas_fee,
                    timestamp,
                );
                rec.token_id = Some(token_id.clone());
                rec.quote_token = Some(quote_token.clone());
                rec.min_price = Some(min_price.clone());
                rec.end_time = Some(*end_time);
                Self::Order(rec)
            }
            EventPayload::OrderForSale { seller, order_id, token_id, price } => {
                let mut rec = OrderEventRecord::base(
                    OrderEventType::OrderForSale,
                    block_number,
                    tx,
                    seller.clone(),
                    *order_id,
                    gas_fee,
                    timestamp,
                );
                rec.token_id = Some(token_id.clone());
                rec.price = Some(price.clone());
                Self::Order(rec)
            }
            EventPayload::OrderPriceChanged { seller, order_id, old_price, new_price } => {
                let mut rec = OrderEventRecord::base(
                    OrderEventType::OrderPriceChanged,
                    block_number,
                    tx,
                    seller.clone(),
                    *order_id,
                    gas_fee,
                    timestamp,
                );
                rec.old_price = Some(old_price.clone());
                rec.new_price = Some(new_price.clone());
                Self::Order(rec)
            }
            EventPayload::OrderFilled {
                seller,
                buyer,
                order_id,
                quote_token,
                price,
                royalty_owner,
                royalty_fee,
                platform_address,
                platform_fee,
            } => {
                let mut rec = OrderEventRecord::base(
                    OrderEventType::OrderFilled,
                    block_number,
                    tx,
                    seller.clone(),
                    *order_id,
                    gas_fee,
                    timestamp,
                );
                rec.buyer = Some(buyer.clone());
                rec.quote_token = Some(quote_token.clone());
                rec.price = Some(price.clone());
                rec.royalty_owner = Some(royalty_owner.clone());
                rec.royalty_fee = Some(royalty_fee.clone());
                rec.platform_address = Some(platform_address.clone());
                rec.platform_fee = Some(platform_fee.clone());
                Self::Order(rec)
            }
            EventPayload::OrderCancelled { seller, order_id } => Self::Order(OrderEventRecord::base(
                OrderEventType::OrderCancelled,
                block_number,
                tx,
                seller.clone(),
                *order_id,
                gas_fee,
                timestamp,
            )),
            EventPayload::OrderTakenDown { seller, order_id } => Self::Order(OrderEventRecord::base(
                OrderEventType::OrderTakenDown,
                block_number,
                tx,
                seller.clone(),
                *order_id,
                gas_fee,
                timestamp,
            )),
        }
    }

    /// The stream this record belongs to.
    pub fn stream(&self) -> Stream {
        match self {
            Self::Token(_) => Stream::TokenTransfer,
            Self::Bid(_) => Stream::OrderBid,
            Self::Order(rec) => rec.event_type.stream(),
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            Self::Token(rec) => rec.block_number,
            Self::Order(rec) => rec.block_number,
            Self::Bid(rec) => rec.block_number,
        }
    }

    pub fn transaction_hash(&self) -> &str {
        match self {
            Self::Token(rec) => &rec.transaction_hash,
            Self::Order(rec) => &rec.transaction_hash,
            Self::Bid(rec) => &rec.transaction_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(payload: EventPayload) -> RawLogEvent {
        RawLogEvent {
            block_number: 123,
            tx_hash: "0xabc".into(),
            payload,
        }
    }

    #[test]
    fn transfer_becomes_token_record() {
        let event = raw(EventPayload::TokenTransfer {
            from: "0x1".into(),
            to: "0x2".into(),
            token_id: "42".into(),
        });
        let rec = EventRecord::from_event(&event, 0.001, 1_700_000_000);
        assert_eq!(rec.stream(), Stream::TokenTransfer);
        assert_eq!(rec.block_number(), 123);
        match rec {
            EventRecord::Token(t) => {
                assert_eq!(t.token_id, "42");
                assert_eq!(t.timestamp, 1_700_000_000);
            }
            other => panic!("expected token record, got {other:?}"),
        }
    }

    #[test]
    fn bid_gets_its_own_collection() {
        let event = raw(EventPayload::OrderBid {
            seller: "0xs".into(),
            buyer: "0xb".into(),
            order_id: 9,
            price: "5000".into(),
        });
        let rec = EventRecord::from_event(&event, 0.0, 0);
        assert_eq!(rec.stream(), Stream::OrderBid);
        assert!(matches!(rec, EventRecord::Bid(_)));
    }

    #[test]
    fn auction_record_carries_kind_fields() {
        let event = raw(EventPayload::OrderForAuction {
            seller: "0xs".into(),
            order_id: 1,
            token_id: "7".into(),
            quote_token: "0xq".into(),
            min_price: "100".into(),
            end_time: 99,
        });
        match EventRecord::from_event(&event, 0.0, 0) {
            EventRecord::Order(rec) => {
                assert_eq!(rec.event_type, OrderEventType::OrderForAuction);
                assert_eq!(rec.min_price.as_deref(), Some("100"));
                assert_eq!(rec.end_time, Some(99));
                assert!(rec.buyer.is_none());
            }
            other => panic!("expected order record, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_record_omits_absent_fields_in_json() {
        let event = raw(EventPayload::OrderCancelled {
            seller: "0xs".into(),
            order_id: 4,
        });
        let rec = EventRecord::from_event(&event, 0.0, 0);
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("price").is_none());
        assert_eq!(json["orderId"], 4);
    }
}
