//! Fixed-width word codec for logs and contract reads.
//!
//! Every event shape and read-call return in this pipeline is known at
//! compile time, so decoding is plain 32-byte-word slicing: indexed
//! parameters sit in `topics[1..]`, the rest are consecutive words in
//! `data`, and dynamic strings are offset + length + bytes.

use serde::{Deserialize, Serialize};

use marketsync_core::contract::{OrderInfo, OrderState, TokenInfo};
use marketsync_core::event::{EventPayload, RawLogEvent};
use marketsync_core::stream::Stream;

use crate::error::NodeError;

/// An entry of an `eth_getLogs` response / `logs` subscription notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

// ─── Hex word helpers ─────────────────────────────────────────────────────────

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16).map_err(|e| format!("bad hex quantity {s:?}: {e}"))
}

/// Parse a hex quantity to u128 (gas prices exceed u64 on some chains).
pub fn parse_hex_u128(s: &str) -> Result<u128, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(s, 16).map_err(|e| format!("bad hex quantity {s:?}: {e}"))
}

fn strip0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

/// The `i`-th 32-byte word of ABI-encoded data, as 64 hex chars.
fn data_word(data: &str, i: usize) -> Result<&str, String> {
    let data = strip0x(data);
    data.get(i * 64..(i + 1) * 64)
        .ok_or_else(|| format!("data too short for word {i}"))
}

/// An indexed parameter: `topics[i]`, normalized to 64 hex chars.
fn topic_word(topics: &[String], i: usize) -> Result<&str, String> {
    let topic = topics.get(i).ok_or_else(|| format!("missing topic {i}"))?;
    let word = strip0x(topic);
    if word.len() != 64 {
        return Err(format!("topic {i} is {} chars, want 64", word.len()));
    }
    Ok(word)
}

/// An address word: the low 20 bytes, rendered `0x…` lower-case.
fn word_to_address(word: &str) -> Result<String, String> {
    if word.len() != 64 {
        return Err(format!("address word is {} chars, want 64", word.len()));
    }
    Ok(format!("0x{}", word[24..].to_ascii_lowercase()))
}

/// A u64-sized word (ids, timestamps, counters, state codes).
fn word_to_u64(word: &str) -> Result<u64, String> {
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(trimmed, 16).map_err(|e| format!("word out of u64 range: {e}"))
}

/// An amount word, rendered as a decimal string (amounts exceed u64).
fn word_to_amount(word: &str) -> Result<String, String> {
    let trimmed = word.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok("0".into());
    }
    u128::from_str_radix(trimmed, 16)
        .map(|n| n.to_string())
        .map_err(|e| format!("amount word out of range: {e}"))
}

/// A dynamic string: word `i` holds a byte offset to (length, bytes).
fn word_to_string(data: &str, i: usize) -> Result<String, String> {
    let data = strip0x(data);
    let offset = word_to_u64(data_word(data, i)?)? as usize;
    if offset % 32 != 0 {
        return Err(format!("string offset {offset} not word-aligned"));
    }
    let len_index = offset / 32;
    let len = word_to_u64(data_word(data, len_index)?)? as usize;
    let start = (len_index + 1) * 64;
    let end = start + len * 2;
    let hex = data
        .get(start..end)
        .ok_or_else(|| format!("data too short for string of {len} bytes"))?;
    let mut bytes = Vec::with_capacity(len);
    for chunk in 0..len {
        let byte = u8::from_str_radix(&hex[chunk * 2..chunk * 2 + 2], 16)
            .map_err(|e| format!("bad string byte: {e}"))?;
        bytes.push(byte);
    }
    String::from_utf8(bytes).map_err(|e| format!("string is not utf-8: {e}"))
}

// ─── Log → payload ────────────────────────────────────────────────────────────

/// Decode a raw log into the stream's typed event, or a skippable
/// [`NodeError::MalformedEvent`].
pub fn decode_log(stream: Stream, log: &RawLog) -> Result<RawLogEvent, NodeError> {
    let malformed = |reason: String| NodeError::MalformedEvent {
        stream,
        tx_hash: log.transaction_hash.clone(),
        reason,
    };
    let block_number = parse_hex_u64(&log.block_number).map_err(&malformed)?;
    let payload = decode_payload(stream, log).map_err(&malformed)?;
    Ok(RawLogEvent {
        block_number,
        tx_hash: log.transaction_hash.clone(),
        payload,
    })
}

fn decode_payload(stream: Stream, log: &RawLog) -> Result<EventPayload, String> {
    let topics = &log.topics;
    let data = &log.data;
    match stream {
        Stream::TokenTransfer => Ok(EventPayload::TokenTransfer {
            from: word_to_address(topic_word(topics, 1)?)?,
            to: word_to_address(topic_word(topics, 2)?)?,
            token_id: word_to_amount(topic_word(topics, 3)?)?,
        }),
        Stream::OrderForAuction => Ok(EventPayload::OrderForAuction {
            seller: word_to_address(topic_word(topics, 1)?)?,
            order_id: word_to_u64(topic_word(topics, 2)?)?,
            token_id: word_to_amount(data_word(data, 0)?)?,
            quote_token: word_to_address(data_word(data, 1)?)?,
            min_price: word_to_amount(data_word(data, 2)?)?,
            end_time: word_to_u64(data_word(data, 3)?)?,
        }),
        Stream::OrderForSale => Ok(EventPayload::OrderForSale {
            seller: word_to_address(topic_word(topics, 1)?)?,
            order_id: word_to_u64(topic_word(topics, 2)?)?,
            token_id: word_to_amount(data_word(data, 0)?)?,
            price: word_to_amount(data_word(data, 1)?)?,
        }),
        Stream::OrderBid => Ok(EventPayload::OrderBid {
            seller: word_to_address(topic_word(topics, 1)?)?,
            buyer: word_to_address(topic_word(topics, 2)?)?,
            order_id: word_to_u64(topic_word(topics, 3)?)?,
            price: word_to_amount(data_word(data, 0)?)?,
        }),
        Stream::OrderPriceChanged => Ok(EventPayload::OrderPriceChanged {
            seller: word_to_address(topic_word(topics, 1)?)?,
            order_id: word_to_u64(topic_word(topics, 2)?)?,
            old_price: word_to_amount(data_word(data, 0)?)?,
            new_price: word_to_amount(data_word(data, 1)?)?,
        }),
        Stream::OrderFilled => Ok(EventPayload::OrderFilled {
            seller: word_to_address(topic_word(topics, 1)?)?,
            buyer: word_to_address(topic_word(topics, 2)?)?,
            order_id: word_to_u64(topic_word(topics, 3)?)?,
            quote_token: word_to_address(data_word(data, 0)?)?,
            price: word_to_amount(data_word(data, 1)?)?,
            royalty_owner: word_to_address(data_word(data, 2)?)?,
            royalty_fee: word_to_amount(data_word(data, 3)?)?,
            platform_address: word_to_address(data_word(data, 4)?)?,
            platform_fee: word_to_amount(data_word(data, 5)?)?,
        }),
        Stream::OrderCancelled => Ok(EventPayload::OrderCancelled {
            seller: word_to_address(topic_word(topics, 1)?)?,
            order_id: word_to_u64(topic_word(topics, 2)?)?,
        }),
        Stream::OrderTakenDown => Ok(EventPayload::OrderTakenDown {
            seller: word_to_address(topic_word(topics, 1)?)?,
            order_id: word_to_u64(topic_word(topics, 2)?)?,
        }),
    }
}

// ─── Calldata assembly ────────────────────────────────────────────────────────

const TOKEN_INFO_SELECTOR: &str = "c87b56dd";
const ORDER_BY_ID_SELECTOR: &str = "d4fac45d";
const ORDER_COUNT_SELECTOR: &str = "3c8da588";
const TOTAL_SUPPLY_SELECTOR: &str = "18160ddd";

fn u64_word(n: u64) -> String {
    format!("{n:064x}")
}

fn amount_word(amount: &str) -> Result<String, String> {
    let n: u128 = amount
        .parse()
        .map_err(|e| format!("bad decimal amount {amount:?}: {e}"))?;
    Ok(format!("{n:064x}"))
}

/// Calldata for `tokenInfo(uint256)`.
pub fn token_info_calldata(token_id: &str) -> Result<String, String> {
    Ok(format!("0x{TOKEN_INFO_SELECTOR}{}", amount_word(token_id)?))
}

/// Calldata for `getOrderById(uint256)`.
pub fn order_by_id_calldata(order_id: u64) -> String {
    format!("0x{ORDER_BY_ID_SELECTOR}{}", u64_word(order_id))
}

/// Calldata for `getOrderCount()`.
pub fn order_count_calldata() -> String {
    format!("0x{ORDER_COUNT_SELECTOR}")
}

/// Calldata for `totalSupply()`.
pub fn total_supply_calldata() -> String {
    format!("0x{TOTAL_SUPPLY_SELECTOR}")
}

// ─── Contract-read returns ────────────────────────────────────────────────────

/// Decode the `tokenInfo(uint256)` return tuple.
///
/// Layout: tokenId, tokenIndex, owner, minter, royaltyOwner, royaltyFee,
/// createTime, updateTime, then the tokenUri string.
pub fn decode_token_info(data: &str) -> Result<TokenInfo, String> {
    Ok(TokenInfo {
        token_id: word_to_amount(data_word(data, 0)?)?,
        token_index: word_to_u64(data_word(data, 1)?)?,
        token_owner: word_to_address(data_word(data, 2)?)?,
        token_minter: word_to_address(data_word(data, 3)?)?,
        royalty_owner: word_to_address(data_word(data, 4)?)?,
        royalty_fee: word_to_amount(data_word(data, 5)?)?,
        create_time: word_to_u64(data_word(data, 6)?)?,
        update_time: word_to_u64(data_word(data, 7)?)?,
        token_uri: word_to_string(data, 8)?,
    })
}

/// Decode the `getOrderById(uint256)` return tuple.
///
/// Layout: orderId, orderState, tokenId, quoteToken, price, seller, buyer,
/// filled, royaltyOwner, royaltyFee, platformAddr, platformFee, lastBid,
/// lastBidder, bids, createTime, updateTime, then the buyerUri string.
pub fn decode_order_info(data: &str) -> Result<OrderInfo, String> {
    let state_code = word_to_u64(data_word(data, 1)?)?;
    let order_state = OrderState::from_code(state_code)
        .ok_or_else(|| format!("unknown order state code {state_code}"))?;
    Ok(OrderInfo {
        order_id: word_to_u64(data_word(data, 0)?)?,
        order_state,
        token_id: word_to_amount(data_word(data, 2)?)?,
        quote_token: word_to_address(data_word(data, 3)?)?,
        price: word_to_amount(data_word(data, 4)?)?,
        seller_addr: word_to_address(data_word(data, 5)?)?,
        buyer_addr: word_to_address(data_word(data, 6)?)?,
        filled: word_to_amount(data_word(data, 7)?)?,
        royalty_owner: word_to_address(data_word(data, 8)?)?,
        royalty_fee: word_to_amount(data_word(data, 9)?)?,
        platform_addr: word_to_address(data_word(data, 10)?)?,
        platform_fee: word_to_amount(data_word(data, 11)?)?,
        last_bid: word_to_amount(data_word(data, 12)?)?,
        last_bidder: word_to_address(data_word(data, 13)?)?,
        bids: word_to_u64(data_word(data, 14)?)?,
        create_time: word_to_u64(data_word(data, 15)?)?,
        update_time: word_to_u64(data_word(data, 16)?)?,
        buyer_uri: word_to_string(data, 17)?,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn addr_word(addr: &str) -> String {
        format!("{:0>64}", strip0x(addr))
    }

    fn num_word(n: u128) -> String {
        format!("{n:064x}")
    }

    fn string_tail(s: &str) -> String {
        // length word + padded utf-8 bytes
        let hex: String = s.bytes().map(|b| format!("{b:02x}")).collect();
        let padded_len = (hex.len() + 63) / 64 * 64;
        format!("{}{:0<width$}", num_word(s.len() as u128), hex, width = padded_len)
    }

    fn log(topics: Vec<String>, data: String) -> RawLog {
        RawLog {
            address: "0xmarket".into(),
            topics,
            data: format!("0x{data}"),
            block_number: "0x64".into(),
            transaction_hash: "0xdeadbeef".into(),
        }
    }

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert_eq!(parse_hex_u128("0x12a05f200").unwrap(), 5_000_000_000);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn transfer_log_decodes_from_topics() {
        let raw = log(
            vec![
                Stream::TokenTransfer.signature_topic().into(),
                format!("0x{}", addr_word("1111111111111111111111111111111111111111")),
                format!("0x{}", addr_word("2222222222222222222222222222222222222222")),
                format!("0x{}", num_word(42)),
            ],
            String::new(),
        );
        let event = decode_log(Stream::TokenTransfer, &raw).unwrap();
        assert_eq!(event.block_number, 100);
        match event.payload {
            EventPayload::TokenTransfer { from, to, token_id } => {
                assert_eq!(from, "0x1111111111111111111111111111111111111111");
                assert_eq!(to, "0x2222222222222222222222222222222222222222");
                assert_eq!(token_id, "42");
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn auction_log_splits_topics_and_data() {
        let data = format!(
            "{}{}{}{}",
            num_word(7),                                             // tokenId
            addr_word("00000000000000000000000000000000000000aa"),   // quoteToken
            num_word(1_000_000_000_000_000_000),                     // minPrice: 1e18
            num_word(1_700_000_000),                                 // endTime
        );
        let raw = log(
            vec![
                Stream::OrderForAuction.signature_topic().into(),
                format!("0x{}", addr_word("33333333333333333333333333333333333333cc")),
                format!("0x{}", num_word(12)),
            ],
            data,
        );
        let event = decode_log(Stream::OrderForAuction, &raw).unwrap();
        match event.payload {
            EventPayload::OrderForAuction { seller, order_id, token_id, quote_token, min_price, end_time } => {
                assert_eq!(seller, "0x33333333333333333333333333333333333333cc");
                assert_eq!(order_id, 12);
                assert_eq!(token_id, "7");
                assert_eq!(quote_token, "0x00000000000000000000000000000000000000aa");
                assert_eq!(min_price, "1000000000000000000");
                assert_eq!(end_time, 1_700_000_000);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn short_data_is_malformed_not_panic() {
        let raw = log(
            vec![
                Stream::OrderForSale.signature_topic().into(),
                format!("0x{}", addr_word("aa")),
                format!("0x{}", num_word(3)),
            ],
            num_word(5), // only one word; price word missing
        );
        let err = decode_log(Stream::OrderForSale, &raw).unwrap_err();
        match err {
            NodeError::MalformedEvent { stream, tx_hash, .. } => {
                assert_eq!(stream, Stream::OrderForSale);
                assert_eq!(tx_hash, "0xdeadbeef");
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn missing_topic_is_malformed() {
        let raw = log(vec![Stream::OrderCancelled.signature_topic().into()], String::new());
        assert!(decode_log(Stream::OrderCancelled, &raw).is_err());
    }

    #[test]
    fn calldata_is_selector_plus_words() {
        assert_eq!(
            order_by_id_calldata(5),
            format!("0xd4fac45d{}", num_word(5))
        );
        assert_eq!(total_supply_calldata(), "0x18160ddd");
        let call = token_info_calldata("42").unwrap();
        assert!(call.starts_with("0xc87b56dd"));
        assert!(call.ends_with(&num_word(42)));
    }

    #[test]
    fn token_info_return_decodes() {
        let head = format!(
            "{}{}{}{}{}{}{}{}{}",
            num_word(42),                                            // tokenId
            num_word(3),                                             // tokenIndex
            addr_word("00000000000000000000000000000000000000ee"),   // owner
            addr_word("00000000000000000000000000000000000000ff"),   // minter
            addr_word("00000000000000000000000000000000000000ab"),   // royaltyOwner
            num_word(250),                                           // royaltyFee
            num_word(1000),                                          // createTime
            num_word(2000),                                          // updateTime
            num_word(9 * 32),                                        // uri offset
        );
        let data = format!("0x{head}{}", string_tail("ipfs://meta/42"));
        let info = decode_token_info(&data).unwrap();
        assert_eq!(info.token_id, "42");
        assert_eq!(info.token_owner, "0x00000000000000000000000000000000000000ee");
        assert_eq!(info.token_uri, "ipfs://meta/42");
        assert_eq!(info.update_time, 2000);
    }

    #[test]
    fn order_info_return_decodes() {
        let head = format!(
            "{}{}{}{}{}{}{}{}{}{}{}{}{}{}{}{}{}{}",
            num_word(12),                                            // orderId
            num_word(2),                                             // orderState = Filled
            num_word(7),                                             // tokenId
            addr_word("00000000000000000000000000000000000000aa"),   // quoteToken
            num_word(5_000),                                         // price
            addr_word("00000000000000000000000000000000000000cc"),   // seller
            addr_word("00000000000000000000000000000000000000dd"),   // buyer
            num_word(5_000),                                         // filled
            addr_word("00000000000000000000000000000000000000ab"),   // royaltyOwner
            num_word(250),                                           // royaltyFee
            addr_word("00000000000000000000000000000000000000ba"),   // platformAddr
            num_word(20),                                            // platformFee
            num_word(4_800),                                         // lastBid
            addr_word("00000000000000000000000000000000000000dd"),   // lastBidder
            num_word(3),                                             // bids
            num_word(100),                                           // createTime
            num_word(200),                                           // updateTime
            num_word(18 * 32),                                       // buyerUri offset
        );
        let data = format!("0x{head}{}", string_tail("did:buyer"));
        let info = decode_order_info(&data).unwrap();
        assert_eq!(info.order_id, 12);
        assert_eq!(info.order_state, OrderState::Filled);
        assert_eq!(info.filled, "5000");
        assert_eq!(info.bids, 3);
        assert_eq!(info.buyer_uri, "did:buyer");
    }

    #[test]
    fn unknown_order_state_rejected() {
        let mut words = vec![num_word(1), num_word(9)];
        words.extend(std::iter::repeat(num_word(0)).take(16));
        let data = format!("0x{}", words.concat());
        assert!(decode_order_info(&data).is_err());
    }
}
