//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! Transient failures (connection refused, timeout, 5xx) retry with
//! exponential backoff; node-side error objects do not. Batches go out as a
//! single JSON array.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::NodeError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::RpcTransport;
use crate::wire::{RpcRequest, RpcResponse};

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP transport with retry and true array batching.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, NodeError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NodeError::NodeUnavailable(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    /// Transport with default retry/timeout settings.
    pub fn default_for(url: impl Into<String>) -> Result<Self, NodeError> {
        Self::new(url, HttpClientConfig::default())
    }

    async fn post_json<B, R>(&self, body: &B) -> Result<R, NodeError>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| NodeError::NodeUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NodeError::NodeUnavailable(format!("HTTP {status}: {body}")));
        }

        resp.json::<R>()
            .await
            .map_err(|e| NodeError::NodeUnavailable(e.to_string()))
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T, NodeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, NodeError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, url = %self.url, "max retries exceeded");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, NodeError> {
        self.with_retry(|| self.post_json::<RpcRequest, RpcResponse>(&req)).await
    }

    /// All requests in one HTTP call as a JSON array.
    async fn send_batch(&self, reqs: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, NodeError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        self.with_retry(|| self.post_json::<[RpcRequest], Vec<RpcResponse>>(&reqs)).await
    }

    fn url(&self) -> &str {
        &self.url
    }
}
