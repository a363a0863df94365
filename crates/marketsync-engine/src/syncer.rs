//! The per-stream sync state machine.
//!
//! ```text
//! Resolving → Backfilling (optional) → LiveTailing
//!                                          └─ Failed
//! ```
//!
//! Resolution snapshots `current_height` and the derived checkpoint. A gap
//! small enough for the subscription's inclusive replay skips backfill
//! entirely; otherwise the start height is frozen *before* backfill begins
//! so the live tail can start exactly one block after it — no block is
//! processed by both phases and none falls between them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use marketsync_core::event::RawLogEvent;
use marketsync_core::stream::Stream;
use marketsync_core::{CheckpointResolver, SyncError};
use marketsync_rpc::{NodeClient, NodeError, RetryPolicy};

use crate::process::EventProcessor;
use crate::windows::{backfill_windows, needs_backfill};

/// Where a stream's syncer currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Resolving,
    Backfilling,
    LiveTailing,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolving => write!(f, "resolving"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::LiveTailing => write!(f, "live-tailing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Tunables for one stream's syncer.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Historical page width in blocks.
    pub step_size: u64,
    /// Pause between backfill window requests.
    pub window_delay: Duration,
    /// Upper bound on windows being enriched/persisted concurrently.
    pub max_inflight_windows: usize,
    /// First resubscribe delay after a dropped subscription.
    pub resubscribe_initial: Duration,
    /// Resubscribe delay cap.
    pub resubscribe_max: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            step_size: 10_000,
            window_delay: Duration::from_secs(10),
            max_inflight_windows: 4,
            resubscribe_initial: Duration::from_millis(500),
            resubscribe_max: Duration::from_secs(60),
        }
    }
}

/// One stream's backfill + live-tail driver.
pub struct StreamSyncer {
    stream: Stream,
    client: Arc<dyn NodeClient>,
    resolver: Arc<CheckpointResolver>,
    processor: Arc<EventProcessor>,
    settings: SyncSettings,
    phase: SyncPhase,
}

impl StreamSyncer {
    pub fn new(
        stream: Stream,
        client: Arc<dyn NodeClient>,
        resolver: Arc<CheckpointResolver>,
        processor: Arc<EventProcessor>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            stream,
            client,
            resolver,
            processor,
            settings,
            phase: SyncPhase::Resolving,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Drive the stream until shutdown or an unrecoverable error.
    ///
    /// A failure here never touches the other streams; the supervisor only
    /// logs the exit.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), SyncError> {
        let now_height = match self.client.current_height().await {
            Ok(height) => height,
            Err(e) => {
                self.phase = SyncPhase::Failed;
                return Err(SyncError::Aborted {
                    reason: format!("{}: cannot resolve current height: {e}", self.stream),
                });
            }
        };
        let last_height = self.resolver.last_height(self.stream).await?;

        let sync_start = if needs_backfill(last_height, now_height, self.settings.step_size) {
            // Freeze the seam before any window is requested.
            self.phase = SyncPhase::Backfilling;
            if let Err(e) = self.backfill(last_height, now_height, &mut stop).await {
                self.phase = SyncPhase::Failed;
                return Err(e);
            }
            now_height
        } else {
            tracing::info!(
                stream = %self.stream,
                last_height,
                now_height,
                "gap within live replay reach, skipping backfill"
            );
            last_height
        };

        if *stop.borrow() {
            return Ok(());
        }
        self.live_tail(sync_start + 1, stop).await
    }

    async fn backfill(
        &self,
        last_height: u64,
        now_height: u64,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), SyncError> {
        let windows = backfill_windows(last_height, now_height, self.settings.step_size);
        tracing::info!(
            stream = %self.stream,
            from = last_height + 1,
            to = now_height,
            windows = windows.len(),
            "backfill starting"
        );

        let limiter = Arc::new(Semaphore::new(self.settings.max_inflight_windows));
        let mut inflight: JoinSet<Result<(), SyncError>> = JoinSet::new();

        let total = windows.len();
        for (index, (from_block, to_block)) in windows.into_iter().enumerate() {
            if *stop.borrow() {
                break;
            }

            let events = self.fetch_window(from_block, to_block).await?;
            tracing::info!(
                stream = %self.stream,
                from_block,
                to_block,
                events = events.len(),
                window = index + 1,
                total,
                "window fetched"
            );

            // Window processing runs behind the fetch loop, bounded by the
            // permit pool; the next window is requested while this one
            // enriches and persists.
            let permit = limiter
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Aborted { reason: e.to_string() })?;
            let processor = self.processor.clone();
            inflight.spawn(async move {
                let _permit = permit;
                for event in &events {
                    processor.process(event).await?;
                }
                Ok(())
            });

            while let Some(done) = inflight.try_join_next() {
                flatten_window_result(done)?;
            }

            if index + 1 < total && sleep_or_stop(stop, self.settings.window_delay).await {
                break;
            }
        }

        while let Some(done) = inflight.join_next().await {
            flatten_window_result(done)?;
        }
        tracing::info!(stream = %self.stream, to = now_height, "backfill complete");
        Ok(())
    }

    /// Fetch one window, retrying transient failures and splitting on
    /// `RangeTooLarge` until the node accepts the width.
    async fn fetch_window(&self, from: u64, to: u64) -> Result<Vec<RawLogEvent>, SyncError> {
        let retry = RetryPolicy::default();
        let mut queue = VecDeque::from([(from, to)]);
        let mut events = Vec::new();

        while let Some((from, to)) = queue.pop_front() {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match self.client.historical_events(self.stream, from, to).await {
                    Ok(batch) => {
                        events.extend(batch);
                        break;
                    }
                    Err(NodeError::RangeTooLarge { .. }) if to > from => {
                        let mid = from + (to - from) / 2;
                        queue.push_front((mid + 1, to));
                        queue.push_front((from, mid));
                        break;
                    }
                    Err(e) if e.is_retryable() => match retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                stream = %self.stream,
                                from,
                                to,
                                attempt,
                                error = %e,
                                "retrying window fetch"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(SyncError::Node(e.to_string())),
                    },
                    Err(e) => return Err(SyncError::Node(e.to_string())),
                }
            }
        }
        Ok(events)
    }

    async fn live_tail(
        &mut self,
        start_block: u64,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), SyncError> {
        let mut from_block = start_block;
        let mut backoff = self.settings.resubscribe_initial;

        loop {
            if *stop.borrow() {
                return Ok(());
            }
            let mut events = match self.client.subscribe_live(self.stream, from_block).await {
                Ok(events) => events,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        stream = %self.stream,
                        from_block,
                        error = %e,
                        delay_ms = backoff.as_millis() as u64,
                        "subscribe failed, backing off"
                    );
                    if sleep_or_stop(&mut stop, backoff).await {
                        return Ok(());
                    }
                    backoff = (backoff * 2).min(self.settings.resubscribe_max);
                    continue;
                }
                Err(e) => {
                    self.phase = SyncPhase::Failed;
                    return Err(SyncError::Node(e.to_string()));
                }
            };

            self.phase = SyncPhase::LiveTailing;
            backoff = self.settings.resubscribe_initial;
            tracing::info!(stream = %self.stream, from_block, "live tail open");

            loop {
                tokio::select! {
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            return Ok(());
                        }
                    }
                    item = events.recv() => match item {
                        Some(Ok(event)) => {
                            if let Err(e) = self.processor.process(&event).await {
                                self.phase = SyncPhase::Failed;
                                return Err(e);
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(stream = %self.stream, error = %e, "subscription dropped");
                            break;
                        }
                        None => {
                            tracing::warn!(stream = %self.stream, "subscription channel closed");
                            break;
                        }
                    }
                }
            }

            // Resume from the derived checkpoint — whatever made it into the
            // store is the truth about where we left off.
            from_block = self.resolver.last_height(self.stream).await? + 1;
            if sleep_or_stop(&mut stop, backoff).await {
                return Ok(());
            }
            backoff = (backoff * 2).min(self.settings.resubscribe_max);
        }
    }
}

fn flatten_window_result(
    joined: Result<Result<(), SyncError>, tokio::task::JoinError>,
) -> Result<(), SyncError> {
    match joined {
        Ok(inner) => inner,
        Err(e) => Err(SyncError::Aborted { reason: format!("window task: {e}") }),
    }
}

/// Sleep, but wake early on shutdown. Returns `true` if stopping.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}
