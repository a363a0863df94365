//! The `RpcTransport` trait — how requests reach a node.

use async_trait::async_trait;

use crate::error::NodeError;
use crate::wire::{RpcRequest, RpcResponse};

/// An async JSON-RPC transport.
///
/// Object-safe: the node client holds it as `Arc<dyn RpcTransport>` so tests
/// can substitute a scripted transport.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send one request and await its response.
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, NodeError>;

    /// Send several requests in one round trip.
    ///
    /// The default loops over [`send`](Self::send); implementations with a
    /// real batch endpoint override it. Callers may NOT assume response
    /// order matches request order — match on response id.
    async fn send_batch(&self, reqs: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, NodeError> {
        let mut responses = Vec::with_capacity(reqs.len());
        for req in reqs {
            responses.push(self.send(req).await?);
        }
        Ok(responses)
    }

    /// Endpoint identifier, for logs.
    fn url(&self) -> &str;
}
