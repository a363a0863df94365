//! Launches one independently supervised task per stream.
//!
//! Streams start with a configured stagger so process start does not hammer
//! the remote node with eight height queries and eight subscriptions at
//! once. A stream that fails stays down and is logged; the others are
//! untouched.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use marketsync_core::store::EventStore;
use marketsync_core::stream::Stream;
use marketsync_core::{CheckpointResolver, DomainReactor};
use marketsync_rpc::NodeClient;

use crate::process::EventProcessor;
use crate::syncer::{StreamSyncer, SyncSettings};

/// Builds and launches the eight stream syncers.
pub struct Supervisor {
    client: Arc<dyn NodeClient>,
    store: Arc<dyn EventStore>,
    resolver: Arc<CheckpointResolver>,
    reactor: Arc<dyn DomainReactor>,
    settings: SyncSettings,
    market_address: String,
    stagger: Duration,
}

impl Supervisor {
    pub fn new(
        client: Arc<dyn NodeClient>,
        store: Arc<dyn EventStore>,
        resolver: Arc<CheckpointResolver>,
        reactor: Arc<dyn DomainReactor>,
        settings: SyncSettings,
        market_address: impl Into<String>,
        stagger: Duration,
    ) -> Self {
        Self {
            client,
            store,
            resolver,
            reactor,
            settings,
            market_address: market_address.into(),
            stagger,
        }
    }

    /// Spawn every stream's task. Returns immediately; use the handle to
    /// stop and drain.
    pub fn spawn(&self) -> SupervisorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        for (index, stream) in Stream::ALL.into_iter().enumerate() {
            let delay = self.stagger * index as u32;
            let processor = Arc::new(EventProcessor::new(
                self.client.clone(),
                self.store.clone(),
                self.reactor.clone(),
                self.market_address.clone(),
            ));
            let syncer = StreamSyncer::new(
                stream,
                self.client.clone(),
                self.resolver.clone(),
                processor,
                self.settings.clone(),
            );
            let mut stop = stop_rx.clone();

            tasks.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            return;
                        }
                    }
                }
                tracing::info!(%stream, "stream syncer starting");
                match syncer.run(stop).await {
                    Ok(()) => tracing::info!(%stream, "stream syncer stopped"),
                    Err(e) => tracing::error!(%stream, error = %e, "stream syncer failed"),
                }
            });
        }

        SupervisorHandle { stop: stop_tx, tasks }
    }
}

/// Handle over the running stream tasks.
pub struct SupervisorHandle {
    stop: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

impl SupervisorHandle {
    /// Signal every stream to stop accepting events and drain.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for all stream tasks to exit.
    pub async fn join(mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    /// Number of stream tasks still running.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }
}
