//! Environment-sourced configuration.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Everything the pipeline needs to run, sourced from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// JSON-RPC endpoint for height/log/batch queries.
    pub http_url: String,
    /// WebSocket endpoint for the live log subscription.
    pub ws_url: String,
    /// Token contract address (lower-cased `0x…`).
    pub token_address: String,
    /// Market contract address; transfers into it are escrow moves, not
    /// ownership changes.
    pub market_address: String,
    /// Checkpoint fallback for the token stream.
    pub token_deploy_height: u64,
    /// Checkpoint fallback for the market streams.
    pub market_deploy_height: u64,
    /// Historical page width in blocks.
    #[serde(default = "default_step_size")]
    pub step_size: u64,
    /// Pause between backfill window requests (remote rate limits).
    #[serde(default = "default_window_delay_ms")]
    pub window_delay_ms: u64,
    /// Upper bound on windows being enriched/persisted concurrently.
    #[serde(default = "default_max_inflight_windows")]
    pub max_inflight_windows: usize,
    /// Launch stagger between stream tasks at startup.
    #[serde(default = "default_stagger_ms")]
    pub stream_stagger_ms: u64,
    /// Drift monitor period.
    #[serde(default = "default_drift_interval_ms")]
    pub drift_interval_ms: u64,
    /// `"memory"` or a SQLite database path.
    #[serde(default = "default_db")]
    pub db: String,
}

fn default_step_size() -> u64 {
    10_000
}
fn default_window_delay_ms() -> u64 {
    10_000
}
fn default_max_inflight_windows() -> usize {
    4
}
fn default_stagger_ms() -> u64 {
    1_000
}
fn default_drift_interval_ms() -> u64 {
    120_000
}
fn default_db() -> String {
    "memory".into()
}

impl SyncConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Ok(Self {
            http_url: require("MARKETSYNC_HTTP_URL")?,
            ws_url: require("MARKETSYNC_WS_URL")?,
            token_address: require("CONTRACT_TOKEN")?.to_lowercase(),
            market_address: require("CONTRACT_MARKET")?.to_lowercase(),
            token_deploy_height: require_u64("CONTRACT_TOKEN_DEPLOY")?,
            market_deploy_height: require_u64("CONTRACT_MARKET_DEPLOY")?,
            step_size: optional_u64("MARKETSYNC_STEP_SIZE")?.unwrap_or_else(default_step_size),
            window_delay_ms: optional_u64("MARKETSYNC_WINDOW_DELAY_MS")?
                .unwrap_or_else(default_window_delay_ms),
            max_inflight_windows: optional_u64("MARKETSYNC_MAX_INFLIGHT_WINDOWS")?
                .map(|n| n as usize)
                .unwrap_or_else(default_max_inflight_windows),
            stream_stagger_ms: optional_u64("MARKETSYNC_STAGGER_MS")?
                .unwrap_or_else(default_stagger_ms),
            drift_interval_ms: optional_u64("MARKETSYNC_DRIFT_INTERVAL_MS")?
                .unwrap_or_else(default_drift_interval_ms),
            db: std::env::var("MARKETSYNC_DB").unwrap_or_else(|_| default_db()),
        })
    }
}

fn require(name: &str) -> Result<String, SyncError> {
    std::env::var(name).map_err(|_| SyncError::Config(format!("{name} is not set")))
}

fn require_u64(name: &str) -> Result<u64, SyncError> {
    require(name)?
        .parse()
        .map_err(|e| SyncError::Config(format!("{name}: {e}")))
}

fn optional_u64(name: &str) -> Result<Option<u64>, SyncError> {
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| SyncError::Config(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg: SyncConfig = serde_json::from_value(serde_json::json!({
            "http_url": "http://localhost:8545",
            "ws_url": "ws://localhost:8546",
            "token_address": "0xtoken",
            "market_address": "0xmarket",
            "token_deploy_height": 100,
            "market_deploy_height": 200,
        }))
        .unwrap();

        assert_eq!(cfg.step_size, 10_000);
        assert_eq!(cfg.window_delay_ms, 10_000);
        assert_eq!(cfg.max_inflight_windows, 4);
        assert_eq!(cfg.db, "memory");
    }

    #[test]
    fn missing_required_env_is_a_config_error() {
        std::env::remove_var("MARKETSYNC_HTTP_URL");
        let err = SyncConfig::from_env().unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
