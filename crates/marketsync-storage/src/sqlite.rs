//! SQLite event store.
//!
//! Single-file persistence via `sqlx`, WAL mode for concurrent reads.
//! Records are stored as their JSON shape next to the indexed columns the
//! checkpoint derivation needs; projections are JSON rows merged
//! field-by-field inside a transaction.
//!
//! # Usage
//! ```rust,no_run
//! use marketsync_storage::sqlite::SqliteEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteEventStore::open("./marketsync.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteEventStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use marketsync_core::record::{EventRecord, OrderEventType};
use marketsync_core::store::{EntityKind, EventStore};
use marketsync_core::stream::Stream;
use marketsync_core::SyncError;

/// SQLite-backed `EventStore`.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

fn storage_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Persistence(e.to_string())
}

fn event_type_column(event_type: OrderEventType) -> &'static str {
    match event_type {
        OrderEventType::OrderForAuction => "OrderForAuction",
        OrderEventType::OrderForSale => "OrderForSale",
        OrderEventType::OrderPriceChanged => "OrderPriceChanged",
        OrderEventType::OrderFilled => "OrderFilled",
        OrderEventType::OrderCancelled => "OrderCancelled",
        OrderEventType::OrderTakenDown => "OrderTakenDown",
    }
}

impl SqliteEventStore {
    /// Open (or create) a database at `path`.
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database; data dies with the pool.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePool::connect("sqlite::memory:").await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        for statement in [
            "CREATE TABLE IF NOT EXISTS token_events (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                payload      TEXT    NOT NULL,
                stored_at    INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS order_events (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                event_type   TEXT    NOT NULL,
                payload      TEXT    NOT NULL,
                stored_at    INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS bid_order_events (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                block_number INTEGER NOT NULL,
                payload      TEXT    NOT NULL,
                stored_at    INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS projections (
                kind   TEXT NOT NULL,
                key    TEXT NOT NULL,
                fields TEXT NOT NULL,
                PRIMARY KEY (kind, key)
            );",
            // Descending block index per collection: checkpoint derivation
            // is a max() lookup at every stream start and resubscribe.
            "CREATE INDEX IF NOT EXISTS idx_token_events_block
                ON token_events (block_number DESC);",
            "CREATE INDEX IF NOT EXISTS idx_order_events_type_block
                ON order_events (event_type, block_number DESC);",
            "CREATE INDEX IF NOT EXISTS idx_bid_events_block
                ON bid_order_events (block_number DESC);",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    /// Row count of one event collection (reporting/tests).
    pub async fn event_count(&self, stream: Stream) -> Result<u64, SyncError> {
        let row = match stream.order_event_type() {
            None => {
                let table = match stream {
                    Stream::TokenTransfer => "token_events",
                    _ => "bid_order_events",
                };
                sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
                    .fetch_one(&self.pool)
                    .await
            }
            Some(event_type) => {
                sqlx::query("SELECT COUNT(*) AS cnt FROM order_events WHERE event_type = ?")
                    .bind(event_type_column(event_type))
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// A projection row, if it exists (reporting/tests).
    pub async fn projection(
        &self,
        kind: EntityKind,
        key: &str,
    ) -> Result<Option<Map<String, Value>>, SyncError> {
        let row = sqlx::query("SELECT fields FROM projections WHERE kind = ? AND key = ?")
            .bind(kind.to_string())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            None => Ok(None),
            Some(row) => {
                let raw: String = row.get("fields");
                let fields: Map<String, Value> =
                    serde_json::from_str(&raw).map_err(storage_err)?;
                Ok(Some(fields))
            }
        }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, record: EventRecord) -> Result<(), SyncError> {
        let payload = serde_json::to_string(&record).map_err(storage_err)?;
        let block_number = record.block_number() as i64;
        let stored_at = chrono::Utc::now().timestamp();
        match &record {
            EventRecord::Token(_) => {
                sqlx::query(
                    "INSERT INTO token_events (block_number, payload, stored_at) VALUES (?, ?, ?)",
                )
                .bind(block_number)
                .bind(&payload)
                .bind(stored_at)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
            }
            EventRecord::Bid(_) => {
                sqlx::query(
                    "INSERT INTO bid_order_events (block_number, payload, stored_at) VALUES (?, ?, ?)",
                )
                .bind(block_number)
                .bind(&payload)
                .bind(stored_at)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
            }
            EventRecord::Order(rec) => {
                sqlx::query(
                    "INSERT INTO order_events (block_number, event_type, payload, stored_at)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(block_number)
                .bind(event_type_column(rec.event_type))
                .bind(&payload)
                .bind(stored_at)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
            }
        }
        debug!(stream = %record.stream(), block = record.block_number(), "record stored");
        Ok(())
    }

    async fn last_block_number(&self, stream: Stream) -> Result<Option<u64>, SyncError> {
        let row = match stream.order_event_type() {
            None => {
                let table = match stream {
                    Stream::TokenTransfer => "token_events",
                    _ => "bid_order_events",
                };
                sqlx::query(&format!("SELECT MAX(block_number) AS max_block FROM {table}"))
                    .fetch_one(&self.pool)
                    .await
            }
            Some(event_type) => sqlx::query(
                "SELECT MAX(block_number) AS max_block FROM order_events WHERE event_type = ?",
            )
            .bind(event_type_column(event_type))
            .fetch_one(&self.pool)
            .await,
        }
        .map_err(storage_err)?;
        Ok(row.get::<Option<i64>, _>("max_block").map(|n| n as u64))
    }

    async fn apply_projection(
        &self,
        kind: EntityKind,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SyncError> {
        // Read-merge-write in one transaction: concurrent writers to the
        // same key serialize on the row, last writer wins per field.
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let existing = sqlx::query("SELECT fields FROM projections WHERE kind = ? AND key = ?")
            .bind(kind.to_string())
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_err)?;

        let mut row: Map<String, Value> = match existing {
            Some(found) => {
                let raw: String = found.get("fields");
                serde_json::from_str(&raw).map_err(storage_err)?
            }
            None => Map::new(),
        };
        for (field, value) in fields {
            row.insert(field, value);
        }
        let merged = serde_json::to_string(&row).map_err(storage_err)?;

        sqlx::query("INSERT OR REPLACE INTO projections (kind, key, fields) VALUES (?, ?, ?)")
            .bind(kind.to_string())
            .bind(key)
            .bind(&merged)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)
    }

    async fn aggregate_count(&self, kind: EntityKind) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM projections WHERE kind = ?")
            .bind(kind.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
