//! marketsync-rpc — the chain node client.
//!
//! Layers, bottom up:
//! - [`wire`] — JSON-RPC 2.0 request/response types
//! - [`transport`] — the [`transport::RpcTransport`] trait; [`http`] is the
//!   reqwest-backed implementation with retry and true array batching
//! - [`ws`] — one-shot WebSocket log subscription (no reconnect here; the
//!   sync engine supervises reconnection)
//! - [`decode`] — fixed-width word codec: log topics/data → typed payloads,
//!   calldata assembly, contract-read decoding
//! - [`client`] — [`client::NodeClient`], the seam the sync engine consumes

pub mod client;
pub mod decode;
pub mod error;
pub mod http;
pub mod retry;
pub mod transport;
pub mod wire;
pub mod ws;

pub use client::{BlockInfo, CallResult, EvmNodeClient, LiveEvents, NodeCall, NodeClient, TxInfo};
pub use error::NodeError;
pub use http::{HttpClientConfig, HttpTransport};
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::RpcTransport;
