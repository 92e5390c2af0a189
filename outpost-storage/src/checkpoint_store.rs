//! Durable reconciliation checkpoints.
//!
//! One row per model type, holding the opaque pull position handed back by
//! the transport. A checkpoint is persisted before the next page is
//! requested, so a crash mid-reconciliation resumes from the last durable
//! position; re-applied changes are version-gated no-ops.

use crate::database::{optional, Database};
use crate::error::StorageResult;
use rusqlite::{params, Connection};
use std::time::{SystemTime, UNIX_EPOCH};

/// A durable marker of reconciliation progress for one model type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub model_type: String,
    /// Opaque transport cursor.
    pub position: String,
    /// Wall time (millis) the checkpoint was written.
    pub updated_at: u64,
}

/// Reads the checkpoint for a model type.
pub fn get_checkpoint(conn: &Connection, model_type: &str) -> StorageResult<Option<Checkpoint>> {
    optional(conn.query_row(
        "SELECT model_type, position, updated_at FROM checkpoints WHERE model_type = ?1",
        params![model_type],
        |row| {
            Ok(Checkpoint {
                model_type: row.get(0)?,
                position: row.get(1)?,
                updated_at: row.get::<_, i64>(2)? as u64,
            })
        },
    ))
}

/// Writes (upserts) the checkpoint for a model type.
pub fn put_checkpoint(conn: &Connection, model_type: &str, position: &str) -> StorageResult<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    conn.execute(
        "INSERT INTO checkpoints (model_type, position, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(model_type) DO UPDATE SET
            position = excluded.position,
            updated_at = excluded.updated_at",
        params![model_type, position, now as i64],
    )?;
    Ok(())
}

/// Store for reconciliation checkpoints, sharing the database handle.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    db: Database,
}

impl CheckpointStore {
    /// Creates a checkpoint store over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Reads the checkpoint for a model type.
    pub fn get(&self, model_type: &str) -> StorageResult<Option<Checkpoint>> {
        self.db.with_conn(|conn| get_checkpoint(conn, model_type))
    }

    /// Durably records reconciliation progress for a model type.
    pub fn put(&self, model_type: &str, position: &str) -> StorageResult<()> {
        self.db.with_conn(|conn| put_checkpoint(conn, model_type, position))
    }
}
