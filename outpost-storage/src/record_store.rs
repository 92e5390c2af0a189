//! Persistence for records.
//!
//! Connection-level functions are public so the outbox can compose a record
//! write with an event append inside one transaction; [`RecordStore`] wraps
//! them for standalone use.

use crate::database::{optional, Database};
use crate::error::StorageResult;
use outpost_types::{HybridTimestamp, Record, RecordId};
use rusqlite::{params, Connection, Row};
use tracing::debug;

fn record_from_row(row: &Row<'_>) -> Result<Record, rusqlite::Error> {
    let data: String = row.get("data")?;
    let data = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Record {
        id: RecordId::from_string(row.get::<_, String>("id")?),
        model_type: row.get("model_type")?,
        data,
        version: row.get::<_, i64>("version")? as u64,
        last_changed_at: HybridTimestamp::new(
            row.get::<_, i64>("changed_wall")? as u64,
            row.get::<_, i64>("changed_logical")? as u32,
        ),
        deleted: row.get::<_, i64>("deleted")? != 0,
    })
}

/// Upserts a record row, including its tombstone flag.
pub fn save_record(conn: &Connection, record: &Record) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO records (id, model_type, data, version, changed_wall, changed_logical, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            model_type = excluded.model_type,
            data = excluded.data,
            version = excluded.version,
            changed_wall = excluded.changed_wall,
            changed_logical = excluded.changed_logical,
            deleted = excluded.deleted",
        params![
            record.id.as_str(),
            record.model_type,
            record.data.to_string(),
            record.version as i64,
            record.last_changed_at.wall_time() as i64,
            i64::from(record.last_changed_at.logical()),
            i64::from(record.deleted),
        ],
    )?;
    Ok(())
}

/// Fetches a record by id, tombstones included.
pub fn get_record(conn: &Connection, id: &RecordId) -> StorageResult<Option<Record>> {
    optional(conn.query_row(
        "SELECT id, model_type, data, version, changed_wall, changed_logical, deleted
         FROM records WHERE id = ?1",
        params![id.as_str()],
        record_from_row,
    ))
}

/// Applies a remote state iff it is newer than what is stored.
///
/// Returns whether the store was modified. Re-applying the same change is a
/// no-op, so duplicate pulls are harmless, and an older remote version can
/// never overwrite a newer applied state.
pub fn apply_remote(conn: &Connection, remote: &Record) -> StorageResult<bool> {
    let current = get_record(conn, &remote.id)?;
    if let Some(current) = &current {
        if current.version >= remote.version {
            debug!(
                record_id = %remote.id,
                local = current.version,
                remote = remote.version,
                "skipping stale remote state"
            );
            return Ok(false);
        }
    }
    save_record(conn, remote)?;
    Ok(true)
}

/// Raises a record's version after the remote acknowledged a send.
///
/// Version-gated like [`apply_remote`]; acking an already-newer record is a
/// no-op.
pub fn apply_ack(conn: &Connection, id: &RecordId, version: u64) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE records SET version = ?2 WHERE id = ?1 AND version < ?2",
        params![id.as_str(), version as i64],
    )?;
    Ok(changed > 0)
}

/// Store for records, sharing the database handle.
#[derive(Clone, Debug)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Creates a record store over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Saves (upserts) a record.
    pub fn save(&self, record: &Record) -> StorageResult<()> {
        self.db.with_conn(|conn| save_record(conn, record))
    }

    /// Fetches a record by id, tombstones included.
    pub fn get(&self, id: &RecordId) -> StorageResult<Option<Record>> {
        self.db.with_conn(|conn| get_record(conn, id))
    }

    /// Returns the live (non-tombstoned) records of a model type matching
    /// `predicate`.
    pub fn query(
        &self,
        model_type: &str,
        predicate: impl Fn(&Record) -> bool,
    ) -> StorageResult<Vec<Record>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, model_type, data, version, changed_wall, changed_logical, deleted
                 FROM records WHERE model_type = ?1 AND deleted = 0 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![model_type], record_from_row)?;
            let mut records = Vec::new();
            for row in rows {
                let record = row?;
                if predicate(&record) {
                    records.push(record);
                }
            }
            Ok(records)
        })
    }

    /// Tombstones a record. The row is kept so the outbox and
    /// reconciliation can still reason about it. Returns whether a live
    /// record was found.
    pub fn delete(&self, id: &RecordId) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE records SET deleted = 1 WHERE id = ?1 AND deleted = 0",
                rusqlite::params![id.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Applies a remote state iff newer than the stored version.
    pub fn apply_remote(&self, remote: &Record) -> StorageResult<bool> {
        self.db.with_conn(|conn| apply_remote(conn, remote))
    }

    /// Raises a record's version after a remote acknowledgement.
    pub fn apply_ack(&self, id: &RecordId, version: u64) -> StorageResult<bool> {
        self.db.with_conn(|conn| apply_ack(conn, id, version))
    }
}
