//! marketsync-core — foundation for the marketplace event sync pipeline.
//!
//! # Architecture
//!
//! ```text
//! Supervisor → StreamSyncer (one per Stream)
//!                  ├── NodeClient          (height, logs, live tail, batch)
//!                  ├── CheckpointResolver  (derived resume height)
//!                  ├── EventStore          (append-only records + projections)
//!                  └── DomainReactor       (new token / new order / updates)
//! ```
//!
//! This crate holds the pieces shared by every layer: the eight stream
//! definitions, the typed event payloads and persisted record shapes, the
//! store/reactor contracts, checkpoint resolution, and configuration.

pub mod checkpoint;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod reactor;
pub mod record;
pub mod store;
pub mod stream;

pub use checkpoint::CheckpointResolver;
pub use config::SyncConfig;
pub use contract::{OrderInfo, OrderState, TokenInfo};
pub use error::SyncError;
pub use event::{EventPayload, RawLogEvent};
pub use reactor::{DomainReactor, ProjectionReactor};
pub use record::{BidEventRecord, EventRecord, OrderEventRecord, OrderEventType, TokenEventRecord};
pub use store::{EntityKind, EventStore};
pub use stream::{SourceContract, Stream};

/// The zero address; a transfer from it is a mint.
pub const BURN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
