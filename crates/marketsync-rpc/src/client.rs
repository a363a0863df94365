//! The `NodeClient` seam and its EVM implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use marketsync_core::contract::{OrderInfo, TokenInfo};
use marketsync_core::event::RawLogEvent;
use marketsync_core::stream::{SourceContract, Stream};

use crate::decode::{
    self, decode_log, decode_order_info, decode_token_info, parse_hex_u128, parse_hex_u64, RawLog,
};
use crate::error::NodeError;
use crate::transport::RpcTransport;
use crate::wire::{RpcRequest, RpcResponse};

/// A transaction lookup result — what gas-fee computation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TxInfo {
    pub hash: String,
    pub gas: u64,
    pub gas_price: u128,
}

impl TxInfo {
    /// gas × gasPrice, expressed in the ledger's base unit (wei / 10¹⁸).
    pub fn gas_fee(&self) -> f64 {
        self.gas as f64 * self.gas_price as f64 / 1e18
    }
}

/// A block lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

/// One entry of a heterogeneous batch.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeCall {
    Transaction { tx_hash: String },
    Block { number: u64 },
    TokenInfo { token_id: String },
    OrderById { order_id: u64 },
    OrderCount,
    TotalSupply,
}

/// The result of one batch entry, positionally matched to its call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Transaction(TxInfo),
    Block(BlockInfo),
    Token(TokenInfo),
    Order(OrderInfo),
    Count(u64),
}

/// Live subscription handle: events until one terminal `Err`.
pub type LiveEvents = mpsc::Receiver<Result<RawLogEvent, NodeError>>;

/// Everything the sync engine asks of the chain.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Latest known block height.
    async fn current_height(&self) -> Result<u64, NodeError>;

    /// Decoded logs of `stream` in the inclusive range. The caller sizes
    /// the range; an oversized one fails with `RangeTooLarge`. Logs that do
    /// not decode are skipped, never failing the query.
    async fn historical_events(
        &self,
        stream: Stream,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEvent>, NodeError>;

    /// Push channel of `stream` events starting at `from_block` inclusive —
    /// already-mined blocks at or after it are replayed once before
    /// genuinely new ones. No auto-reconnect: one terminal `Err` on loss.
    async fn subscribe_live(&self, stream: Stream, from_block: u64)
        -> Result<LiveEvents, NodeError>;

    /// Execute independent calls in one round trip. Results are ordered to
    /// match `calls`; any failed entry fails the whole batch.
    async fn batch_call(&self, calls: &[NodeCall]) -> Result<Vec<CallResult>, NodeError>;
}

/// `NodeClient` over JSON-RPC: an HTTP transport for queries and batches,
/// a WebSocket endpoint for the live tail.
pub struct EvmNodeClient {
    transport: Arc<dyn RpcTransport>,
    ws_url: String,
    token_address: String,
    market_address: String,
    next_id: AtomicU64,
}

impl EvmNodeClient {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        ws_url: impl Into<String>,
        token_address: impl Into<String>,
        market_address: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            ws_url: ws_url.into(),
            token_address: token_address.into(),
            market_address: market_address.into(),
            next_id: AtomicU64::new(1),
        }
    }

    fn contract_address(&self, stream: Stream) -> &str {
        match stream.source() {
            SourceContract::Token => &self.token_address,
            SourceContract::Market => &self.market_address,
        }
    }

    fn request(&self, method: &str, params: Vec<Value>) -> RpcRequest {
        RpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params)
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, NodeError> {
        let resp = self.transport.send(self.request(method, params)).await?;
        resp.into_result().map_err(NodeError::Rpc)
    }

    fn call_to_request(&self, call: &NodeCall) -> Result<RpcRequest, NodeError> {
        let req = match call {
            NodeCall::Transaction { tx_hash } => {
                self.request("eth_getTransactionByHash", vec![Value::String(tx_hash.clone())])
            }
            NodeCall::Block { number } => self.request(
                "eth_getBlockByNumber",
                vec![Value::String(format!("0x{number:x}")), Value::Bool(false)],
            ),
            NodeCall::TokenInfo { token_id } => {
                let data = decode::token_info_calldata(token_id)
                    .map_err(NodeError::BatchCallFailed)?;
                self.eth_call(&self.token_address, data)
            }
            NodeCall::OrderById { order_id } => {
                self.eth_call(&self.market_address, decode::order_by_id_calldata(*order_id))
            }
            NodeCall::OrderCount => {
                self.eth_call(&self.market_address, decode::order_count_calldata())
            }
            NodeCall::TotalSupply => {
                self.eth_call(&self.token_address, decode::total_supply_calldata())
            }
        };
        Ok(req)
    }

    fn eth_call(&self, to: &str, data: String) -> RpcRequest {
        self.request(
            "eth_call",
            vec![json!({ "to": to, "data": data }), Value::String("latest".into())],
        )
    }

    fn decode_call_result(call: &NodeCall, value: Value) -> Result<CallResult, String> {
        match call {
            NodeCall::Transaction { tx_hash } => {
                let gas = value
                    .get("gas")
                    .and_then(Value::as_str)
                    .ok_or("transaction missing gas")?;
                let gas_price = value
                    .get("gasPrice")
                    .and_then(Value::as_str)
                    .ok_or("transaction missing gasPrice")?;
                Ok(CallResult::Transaction(TxInfo {
                    hash: tx_hash.clone(),
                    gas: parse_hex_u64(gas)?,
                    gas_price: parse_hex_u128(gas_price)?,
                }))
            }
            NodeCall::Block { .. } => {
                let number = value
                    .get("number")
                    .and_then(Value::as_str)
                    .ok_or("block missing number")?;
                let timestamp = value
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .ok_or("block missing timestamp")?;
                Ok(CallResult::Block(BlockInfo {
                    number: parse_hex_u64(number)?,
                    timestamp: parse_hex_u64(timestamp)?,
                }))
            }
            NodeCall::TokenInfo { .. } => {
                let data = value.as_str().ok_or("eth_call returned non-string")?;
                Ok(CallResult::Token(decode_token_info(data)?))
            }
            NodeCall::OrderById { .. } => {
                let data = value.as_str().ok_or("eth_call returned non-string")?;
                Ok(CallResult::Order(decode_order_info(data)?))
            }
            NodeCall::OrderCount | NodeCall::TotalSupply => {
                let data = value.as_str().ok_or("eth_call returned non-string")?;
                Ok(CallResult::Count(parse_hex_u64(data)?))
            }
        }
    }

    /// A node rejecting a wide `eth_getLogs` answers with an error object;
    /// fold the known shapes into `RangeTooLarge` so the caller can shrink.
    fn map_get_logs_error(err: NodeError, from: u64, to: u64) -> NodeError {
        match &err {
            NodeError::Rpc(obj)
                if obj.code == -32005
                    || obj.message.contains("range")
                    || obj.message.contains("limit") =>
            {
                NodeError::RangeTooLarge { from, to }
            }
            _ => err,
        }
    }
}

#[async_trait]
impl NodeClient for EvmNodeClient {
    async fn current_height(&self) -> Result<u64, NodeError> {
        let value = self.call("eth_blockNumber", vec![]).await?;
        let hex = value
            .as_str()
            .ok_or_else(|| NodeError::NodeUnavailable("eth_blockNumber: non-string".into()))?;
        parse_hex_u64(hex).map_err(NodeError::NodeUnavailable)
    }

    async fn historical_events(
        &self,
        stream: Stream,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLogEvent>, NodeError> {
        let filter = json!({
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "address": self.contract_address(stream),
            "topics": [stream.signature_topic()],
        });
        let value = self
            .call("eth_getLogs", vec![filter])
            .await
            .map_err(|e| Self::map_get_logs_error(e, from_block, to_block))?;

        let entries: Vec<Value> = serde_json::from_value(value)?;
        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            let raw: RawLog = match serde_json::from_value(entry) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(%stream, error = %e, "skipping unparseable log entry");
                    continue;
                }
            };
            match decode_log(stream, &raw) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(%stream, error = %e, "skipping malformed event"),
            }
        }
        Ok(events)
    }

    async fn subscribe_live(
        &self,
        stream: Stream,
        from_block: u64,
    ) -> Result<LiveEvents, NodeError> {
        // Subscribe before replaying so blocks mined during the replay fetch
        // arrive live; the overlap can duplicate, never drop.
        let mut live = crate::ws::subscribe_logs(
            &self.ws_url,
            self.contract_address(stream),
            stream.signature_topic(),
        )
        .await?;

        let replay_to = self.current_height().await?;
        let replay = if from_block <= replay_to {
            self.historical_events(stream, from_block, replay_to).await?
        } else {
            vec![]
        };
        tracing::info!(%stream, from_block, replayed = replay.len(), "live tail starting");

        let (tx, rx) = mpsc::channel(1_024);
        tokio::spawn(async move {
            for event in replay {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            while let Some(item) = live.recv().await {
                let forwarded = match item {
                    Ok(raw) => match decode_log(stream, &raw) {
                        Ok(event) => tx.send(Ok(event)).await,
                        Err(e) => {
                            tracing::warn!(%stream, error = %e, "skipping malformed live event");
                            continue;
                        }
                    },
                    Err(terminal) => {
                        let _ = tx.send(Err(terminal)).await;
                        return;
                    }
                };
                if forwarded.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn batch_call(&self, calls: &[NodeCall]) -> Result<Vec<CallResult>, NodeError> {
        if calls.is_empty() {
            return Ok(vec![]);
        }
        let requests: Vec<RpcRequest> = calls
            .iter()
            .map(|c| self.call_to_request(c))
            .collect::<Result<_, _>>()?;
        let ids: Vec<u64> = requests.iter().filter_map(|r| r.id.as_number()).collect();

        let responses = self.transport.send_batch(requests).await?;

        // Nodes may answer a batch in any order; restore request order by id.
        let mut by_id: std::collections::HashMap<u64, RpcResponse> = responses
            .into_iter()
            .filter_map(|r| r.id.as_number().map(|id| (id, r)))
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (call, id) in calls.iter().zip(ids) {
            let resp = by_id
                .remove(&id)
                .ok_or_else(|| NodeError::BatchCallFailed(format!("no response for id {id}")))?;
            let value = resp
                .into_result()
                .map_err(|e| NodeError::BatchCallFailed(format!("entry {id}: {e:?}")))?;
            let result = Self::decode_call_result(call, value)
                .map_err(NodeError::BatchCallFailed)?;
            results.push(result);
        }
        Ok(results)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::wire::RpcErrorObject;

    /// Transport scripted per method; batch responses come back REVERSED to
    /// prove the client restores request order.
    #[derive(Default)]
    struct Scripted {
        by_method: Mutex<HashMap<String, Value>>,
        errors: Mutex<HashMap<String, RpcErrorObject>>,
    }

    impl Scripted {
        fn respond(&self, method: &str, value: Value) {
            self.by_method.lock().unwrap().insert(method.into(), value);
        }

        fn fail(&self, method: &str, code: i64, message: &str) {
            self.errors.lock().unwrap().insert(
                method.into(),
                RpcErrorObject { code, message: message.into(), data: None },
            );
        }

        fn answer(&self, req: &RpcRequest) -> RpcResponse {
            if let Some(err) = self.errors.lock().unwrap().get(&req.method) {
                return RpcResponse {
                    jsonrpc: "2.0".into(),
                    id: req.id.clone(),
                    result: None,
                    error: Some(err.clone()),
                };
            }
            let result = self
                .by_method
                .lock()
                .unwrap()
                .get(&req.method)
                .cloned()
                .unwrap_or(Value::Null);
            RpcResponse {
                jsonrpc: "2.0".into(),
                id: req.id.clone(),
                result: Some(result),
                error: None,
            }
        }
    }

    #[async_trait]
    impl RpcTransport for Scripted {
        async fn send(&self, req: RpcRequest) -> Result<RpcResponse, NodeError> {
            Ok(self.answer(&req))
        }

        async fn send_batch(&self, reqs: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, NodeError> {
            let mut out: Vec<RpcResponse> = reqs.iter().map(|r| self.answer(r)).collect();
            out.reverse();
            Ok(out)
        }

        fn url(&self) -> &str {
            "scripted://"
        }
    }

    fn client(transport: Arc<Scripted>) -> EvmNodeClient {
        EvmNodeClient::new(transport, "ws://unused", "0xtoken", "0xmarket")
    }

    #[test]
    fn gas_fee_is_gas_times_price_over_1e18() {
        let tx = TxInfo {
            hash: "0x1".into(),
            gas: 21_000,
            gas_price: 50_000_000_000,
        };
        assert!((tx.gas_fee() - 0.00000105).abs() < 1e-12);
    }

    #[tokio::test]
    async fn current_height_parses_hex() {
        let transport = Arc::new(Scripted::default());
        transport.respond("eth_blockNumber", Value::String("0x10d4f".into()));
        let height = client(transport).current_height().await.unwrap();
        assert_eq!(height, 68_943);
    }

    #[tokio::test]
    async fn batch_results_match_request_order_despite_reversal() {
        let transport = Arc::new(Scripted::default());
        transport.respond(
            "eth_getTransactionByHash",
            json!({ "gas": "0x5208", "gasPrice": "0xba43b7400" }),
        );
        transport.respond(
            "eth_getBlockByNumber",
            json!({ "number": "0x64", "timestamp": "0x65500000" }),
        );
        transport.respond("eth_call", Value::String(format!("0x{:064x}", 7u64)));

        let calls = vec![
            NodeCall::Transaction { tx_hash: "0xaa".into() },
            NodeCall::Block { number: 100 },
            NodeCall::OrderCount,
        ];
        let results = client(transport).batch_call(&calls).await.unwrap();

        assert_eq!(results.len(), 3);
        match &results[0] {
            CallResult::Transaction(tx) => {
                assert_eq!(tx.gas, 21_000);
                assert_eq!(tx.gas_price, 50_000_000_000);
            }
            other => panic!("slot 0 should be the transaction, got {other:?}"),
        }
        match &results[1] {
            CallResult::Block(block) => assert_eq!(block.number, 100),
            other => panic!("slot 1 should be the block, got {other:?}"),
        }
        assert_eq!(results[2], CallResult::Count(7));
    }

    #[tokio::test]
    async fn failed_entry_fails_whole_batch() {
        let transport = Arc::new(Scripted::default());
        transport.respond(
            "eth_getTransactionByHash",
            json!({ "gas": "0x5208", "gasPrice": "0x1" }),
        );
        transport.fail("eth_getBlockByNumber", -32000, "header not found");

        let calls = vec![
            NodeCall::Transaction { tx_hash: "0xaa".into() },
            NodeCall::Block { number: 100 },
        ];
        let err = client(transport).batch_call(&calls).await.unwrap_err();
        assert!(matches!(err, NodeError::BatchCallFailed(_)));
    }

    #[tokio::test]
    async fn oversized_range_maps_to_range_too_large() {
        let transport = Arc::new(Scripted::default());
        transport.fail("eth_getLogs", -32005, "query exceeds max block range");

        let err = client(transport)
            .historical_events(Stream::OrderBid, 1, 1_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::RangeTooLarge { from: 1, to: 1_000_000 }));
    }

    #[tokio::test]
    async fn one_malformed_log_among_fifty_does_not_block_the_rest() {
        let transport = Arc::new(Scripted::default());
        let mut entries: Vec<Value> = (0..49u64)
            .map(|i| {
                json!({
                    "address": "0xmarket",
                    "topics": [
                        Stream::OrderCancelled.signature_topic(),
                        format!("0x{:0>64}", "cc"),
                        format!("0x{:064x}", i),
                    ],
                    "data": "0x",
                    "blockNumber": format!("0x{:x}", 16 + i),
                    "transactionHash": format!("0xgood{i}"),
                })
            })
            .collect();
        // One log with its order-id topic missing, wedged into the middle
        entries.insert(
            25,
            json!({
                "address": "0xmarket",
                "topics": [Stream::OrderCancelled.signature_topic()],
                "data": "0x",
                "blockNumber": "0x11",
                "transactionHash": "0xbad",
            }),
        );
        transport.respond("eth_getLogs", Value::Array(entries));

        let events = client(transport)
            .historical_events(Stream::OrderCancelled, 1, 100)
            .await
            .unwrap();
        assert_eq!(events.len(), 49);
        assert!(events.iter().all(|e| e.tx_hash != "0xbad"));
    }
}
