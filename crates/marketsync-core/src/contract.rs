//! Contract read models — the enriched state fetched alongside each event.

use serde::{Deserialize, Serialize};

/// On-chain order lifecycle state, numeric codes as the contract stores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderState {
    Created = 1,
    Filled = 2,
    Cancelled = 3,
    TakenDown = 4,
}

impl OrderState {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Created),
            2 => Some(Self::Filled),
            3 => Some(Self::Cancelled),
            4 => Some(Self::TakenDown),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Result of the token contract's `tokenInfo(tokenId)` read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: String,
    pub token_index: u64,
    pub token_owner: String,
    pub token_minter: String,
    pub token_uri: String,
    pub royalty_owner: String,
    pub royalty_fee: String,
    pub create_time: u64,
    pub update_time: u64,
}

/// Result of the market contract's `getOrderById(orderId)` read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub order_id: u64,
    pub order_state: OrderState,
    pub token_id: String,
    pub quote_token: String,
    pub price: String,
    pub seller_addr: String,
    pub buyer_addr: String,
    pub buyer_uri: String,
    pub filled: String,
    pub royalty_owner: String,
    pub royalty_fee: String,
    pub platform_addr: String,
    pub platform_fee: String,
    pub last_bid: String,
    pub last_bidder: String,
    pub bids: u64,
    pub create_time: u64,
    pub update_time: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_state_codes_roundtrip() {
        for state in [
            OrderState::Created,
            OrderState::Filled,
            OrderState::Cancelled,
            OrderState::TakenDown,
        ] {
            assert_eq!(OrderState::from_code(state.code() as u64), Some(state));
        }
        assert_eq!(OrderState::from_code(0), None);
        assert_eq!(OrderState::from_code(9), None);
    }

    #[test]
    fn token_info_serializes_camel_case() {
        let info = TokenInfo {
            token_id: "1".into(),
            token_index: 0,
            token_owner: "0xo".into(),
            token_minter: "0xm".into(),
            token_uri: "ipfs://x".into(),
            royalty_owner: "0xr".into(),
            royalty_fee: "250".into(),
            create_time: 10,
            update_time: 20,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["tokenOwner"], "0xo");
        assert_eq!(json["royaltyFee"], "250");
    }
}
