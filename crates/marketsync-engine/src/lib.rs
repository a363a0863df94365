//! marketsync-engine — the chain event synchronization engine.
//!
//! One [`syncer::StreamSyncer`] per stream:
//!
//! ```text
//! Resolving → Backfilling (optional) → LiveTailing
//!                                          └─ Failed (unrecoverable)
//! ```
//!
//! The [`supervisor::Supervisor`] launches all eight with a start stagger
//! and owns the shutdown signal; the [`drift::DriftMonitor`] periodically
//! compares local counts against the remote contract counters.

pub mod drift;
pub mod process;
pub mod supervisor;
pub mod syncer;
pub mod windows;

pub use drift::DriftMonitor;
pub use process::EventProcessor;
pub use supervisor::Supervisor;
pub use syncer::{StreamSyncer, SyncPhase, SyncSettings};
pub use windows::backfill_windows;
