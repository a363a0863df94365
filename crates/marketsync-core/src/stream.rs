//! The eight fixed event streams and their static metadata.

use serde::{Deserialize, Serialize};

use crate::record::OrderEventType;

/// Which contract a stream's logs are emitted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceContract {
    /// The token (collectible) contract.
    Token,
    /// The marketplace contract.
    Market,
}

/// Which persisted collection a stream's records land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    TokenEvents,
    OrderEvents,
    BidOrderEvents,
}

/// One independently synchronized event kind.
///
/// Every stream runs its own backfill + live tail, keeps its own derived
/// checkpoint, and appends to its own collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    TokenTransfer,
    OrderForAuction,
    OrderForSale,
    OrderBid,
    OrderPriceChanged,
    OrderFilled,
    OrderCancelled,
    OrderTakenDown,
}

impl Stream {
    /// All streams, in supervisor launch order.
    pub const ALL: [Stream; 8] = [
        Stream::TokenTransfer,
        Stream::OrderForAuction,
        Stream::OrderForSale,
        Stream::OrderBid,
        Stream::OrderPriceChanged,
        Stream::OrderFilled,
        Stream::OrderCancelled,
        Stream::OrderTakenDown,
    ];

    /// Contract that emits this stream's logs.
    pub fn source(self) -> SourceContract {
        match self {
            Self::TokenTransfer => SourceContract::Token,
            _ => SourceContract::Market,
        }
    }

    /// Event name as declared in the contract ABI.
    ///
    /// Note the chain-side spelling `OrderCanceled` (single `l`) — it must
    /// be preserved on the wire even though our own naming doubles it.
    pub fn remote_name(self) -> &'static str {
        match self {
            Self::TokenTransfer => "Transfer",
            Self::OrderForAuction => "OrderForAuction",
            Self::OrderForSale => "OrderForSale",
            Self::OrderBid => "OrderBid",
            Self::OrderPriceChanged => "OrderPriceChanged",
            Self::OrderFilled => "OrderFilled",
            Self::OrderCancelled => "OrderCanceled",
            Self::OrderTakenDown => "OrderTakenDown",
        }
    }

    /// keccak256 of the event signature — topic0 for log filtering.
    pub fn signature_topic(self) -> &'static str {
        match self {
            Self::TokenTransfer => {
                // Transfer(address,address,uint256) — the standard ERC-721 topic
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            }
            Self::OrderForAuction => {
                "0x3f58a0ac0e7a0f4e1a9ef7b04bfc4b7b8a31a1d4d0c3a36d70c1f6b3a65d2fe1"
            }
            Self::OrderForSale => {
                "0x8b1c50fb9e0c1a67cbc20b2a910d9b87a5a77e7bd4a8ffcb1c81a65d46857d4a"
            }
            Self::OrderBid => {
                "0x2e0ed91d1c1d1ae2b719ff01df3c48d8d2a2a549861d3c2b7d3f24212e2c52d9"
            }
            Self::OrderPriceChanged => {
                "0xd5f7c1d2ab41f1a905e71b663ecf6f908c5a4b24679b7b4c1bbd41d0e4748b32"
            }
            Self::OrderFilled => {
                "0x9a1f30b4682b8e8b8a23f1e8f31cf51d5f6c17a4dd47f27d76a54f9b3f0e66c2"
            }
            Self::OrderCancelled => {
                "0x61e04f3c1b9d1a8c3ed03dd6a7f23a08a8cbf9fbba36e0a23e1df4dfa933fc0b"
            }
            Self::OrderTakenDown => {
                "0xa38f4d1d2c0e5f6aa6ef0d7d7ae16be1f6e9cbb18a3a9f52be0e9bf5fe3a6d77"
            }
        }
    }

    /// Which collection this stream appends to.
    pub fn collection(self) -> Collection {
        match self {
            Self::TokenTransfer => Collection::TokenEvents,
            Self::OrderBid => Collection::BidOrderEvents,
            _ => Collection::OrderEvents,
        }
    }

    /// The `event_type` discriminator for streams sharing the order-events
    /// collection; `None` for the two dedicated collections.
    pub fn order_event_type(self) -> Option<OrderEventType> {
        match self {
            Self::TokenTransfer | Self::OrderBid => None,
            Self::OrderForAuction => Some(OrderEventType::OrderForAuction),
            Self::OrderForSale => Some(OrderEventType::OrderForSale),
            Self::OrderPriceChanged => Some(OrderEventType::OrderPriceChanged),
            Self::OrderFilled => Some(OrderEventType::OrderFilled),
            Self::OrderCancelled => Some(OrderEventType::OrderCancelled),
            Self::OrderTakenDown => Some(OrderEventType::OrderTakenDown),
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenTransfer => write!(f, "token-transfer"),
            Self::OrderForAuction => write!(f, "order-for-auction"),
            Self::OrderForSale => write!(f, "order-for-sale"),
            Self::OrderBid => write!(f, "order-bid"),
            Self::OrderPriceChanged => write!(f, "order-price-changed"),
            Self::OrderFilled => write!(f, "order-filled"),
            Self::OrderCancelled => write!(f, "order-cancelled"),
            Self::OrderTakenDown => write!(f, "order-taken-down"),
        }
    }
}
