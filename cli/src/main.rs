//! marketsync — syncs token and marketplace contract events from a remote
//! node into local storage.
//!
//! Configuration is environment-sourced; see `SyncConfig`. Run with e.g.:
//!
//! ```bash
//! MARKETSYNC_HTTP_URL=https://rpc.example.org \
//! MARKETSYNC_WS_URL=wss://rpc.example.org/ws \
//! CONTRACT_TOKEN=0x… CONTRACT_MARKET=0x… \
//! CONTRACT_TOKEN_DEPLOY=7744000 CONTRACT_MARKET_DEPLOY=7745000 \
//! marketsync
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use marketsync_core::store::EventStore;
use marketsync_core::{CheckpointResolver, ProjectionReactor, SyncConfig};
use marketsync_engine::{DriftMonitor, Supervisor, SyncSettings};
use marketsync_rpc::{EvmNodeClient, HttpTransport};
use marketsync_storage::sqlite::SqliteEventStore;
use marketsync_storage::MemoryEventStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketsync=info".into()),
        )
        .init();

    let config = SyncConfig::from_env().context("loading configuration")?;
    tracing::info!(
        http = %config.http_url,
        ws = %config.ws_url,
        step = config.step_size,
        db = %config.db,
        "marketsync starting"
    );

    let store: Arc<dyn EventStore> = if config.db == "memory" {
        Arc::new(MemoryEventStore::new())
    } else {
        Arc::new(
            SqliteEventStore::open(&config.db)
                .await
                .context("opening sqlite store")?,
        )
    };

    let transport = Arc::new(
        HttpTransport::default_for(&config.http_url).context("building http transport")?,
    );
    let client = Arc::new(EvmNodeClient::new(
        transport,
        &config.ws_url,
        &config.token_address,
        &config.market_address,
    ));
    let resolver = Arc::new(CheckpointResolver::new(
        store.clone(),
        config.token_deploy_height,
        config.market_deploy_height,
    ));
    let reactor = Arc::new(ProjectionReactor::new(store.clone()));

    let settings = SyncSettings {
        step_size: config.step_size,
        window_delay: Duration::from_millis(config.window_delay_ms),
        max_inflight_windows: config.max_inflight_windows,
        ..SyncSettings::default()
    };

    let supervisor = Supervisor::new(
        client.clone(),
        store.clone(),
        resolver,
        reactor,
        settings,
        config.market_address.clone(),
        Duration::from_millis(config.stream_stagger_ms),
    );
    let handle = supervisor.spawn();

    let (drift_stop_tx, drift_stop_rx) = watch::channel(false);
    let drift = DriftMonitor::new(
        client,
        store,
        Duration::from_millis(config.drift_interval_ms),
    );
    let drift_task = tokio::spawn(drift.run(drift_stop_rx));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested, draining streams");

    handle.shutdown();
    let _ = drift_stop_tx.send(true);
    handle.join().await;
    let _ = drift_task.await;

    tracing::info!("marketsync stopped");
    Ok(())
}
