//! SQLite storage layer for Outpost.
//!
//! Provides durable, restart-surviving persistence for the local data layer:
//! records, outbox entries and reconciliation checkpoints share one database
//! file so a record write and its outbox append commit atomically.
//!
//! # Architecture
//!
//! - [`Database`] guards the single connection and exposes a transaction
//!   helper for multi-table writes
//! - [`RecordStore`] holds records as typed JSON rows with a version counter
//!   and tombstone flag; remote states apply through a version gate so
//!   duplicate or stale changes are no-ops
//! - [`outbox_store`] owns the SQL for outbox rows; the queueing policy on
//!   top of it lives in `outpost-outbox`
//! - [`CheckpointStore`] persists reconciliation cursors per model type

mod checkpoint_store;
mod database;
mod error;
pub mod outbox_store;
pub mod record_store;

pub use checkpoint_store::{Checkpoint, CheckpointStore};
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use outbox_store::{EventStatus, StoredEvent};
pub use record_store::RecordStore;
