//! One-shot WebSocket log subscription.
//!
//! Opens a connection, issues a single `eth_subscribe("logs", …)`, and
//! forwards notifications until the connection dies. There is deliberately no
//! reconnect here: a drop delivers one terminal `Err` and the task ends —
//! the sync engine owns the resubscribe-with-backoff policy and the resume
//! height.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::decode::RawLog;
use crate::error::NodeError;
use crate::wire::{RpcRequest, RpcResponse};

/// Buffer between the socket task and the consumer.
const CHANNEL_CAPACITY: usize = 1_024;

/// Subscribe to logs of `address` with the given topic0 filter.
///
/// Returns once the node has acknowledged the subscription; the receiver
/// then yields raw logs until a terminal `Err(SubscriptionDropped)`.
pub async fn subscribe_logs(
    ws_url: &str,
    address: &str,
    topic0: &str,
) -> Result<mpsc::Receiver<Result<RawLog, NodeError>>, NodeError> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| NodeError::NodeUnavailable(format!("ws connect: {e}")))?;
    let (mut sink, mut stream) = ws_stream.split();

    let req = RpcRequest::new(
        1,
        "eth_subscribe",
        vec![
            Value::String("logs".into()),
            json!({ "address": address, "topics": [topic0] }),
        ],
    );
    let body = serde_json::to_string(&req)?;
    sink.send(Message::Text(body.into()))
        .await
        .map_err(|e| NodeError::NodeUnavailable(format!("ws send: {e}")))?;

    // The node answers the subscribe request before pushing notifications.
    let subscription_id = loop {
        match stream.next().await {
            None => return Err(NodeError::NodeUnavailable("ws closed during subscribe".into())),
            Some(Err(e)) => return Err(NodeError::NodeUnavailable(format!("ws receive: {e}"))),
            Some(Ok(Message::Text(text))) => {
                if let Ok(resp) = serde_json::from_str::<RpcResponse>(text.as_str()) {
                    if resp.id.as_number() == Some(1) {
                        let value = resp.into_result().map_err(NodeError::Rpc)?;
                        match value.as_str() {
                            Some(id) => break id.to_string(),
                            None => {
                                return Err(NodeError::NodeUnavailable(
                                    "subscribe returned non-string id".into(),
                                ))
                            }
                        }
                    }
                }
            }
            Some(Ok(_)) => {}
        }
    };

    tracing::info!(url = %ws_url, address, subscription = %subscription_id, "log subscription open");

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                None => break "stream closed".to_string(),
                Some(Err(e)) => break format!("ws receive: {e}"),
                Some(Ok(Message::Close(_))) => break "close frame".to_string(),
                Some(Ok(Message::Text(text))) => {
                    if let Some(log) = notification_log(text.as_str(), &subscription_id) {
                        match serde_json::from_value::<RawLog>(log) {
                            Ok(raw) => {
                                if tx.send(Ok(raw)).await.is_err() {
                                    return; // consumer gone, nothing to report
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable log notification");
                            }
                        }
                    }
                }
                Some(Ok(_)) => {}
            }
        };
        let _ = tx.send(Err(NodeError::SubscriptionDropped(reason))).await;
    });

    Ok(rx)
}

/// Extract the log payload from an `eth_subscription` notification for our
/// subscription id.
fn notification_log(text: &str, subscription_id: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let params = value.get("params")?;
    if params.get("subscription")?.as_str()? != subscription_id {
        return None;
    }
    Some(params.get("result")?.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_routing_checks_method_and_id() {
        let text = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0xsub1",
                "result": {
                    "address": "0xmarket",
                    "topics": ["0xtopic"],
                    "data": "0x",
                    "blockNumber": "0x10",
                    "transactionHash": "0xabc"
                }
            }
        }"#;
        assert!(notification_log(text, "0xsub1").is_some());
        assert!(notification_log(text, "0xother").is_none());

        let not_sub = r#"{"jsonrpc":"2.0","id":2,"result":"0x1"}"#;
        assert!(notification_log(not_sub, "0xsub1").is_none());
    }
}
