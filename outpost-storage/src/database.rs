//! The shared SQLite handle.
//!
//! Records, outbox entries and reconciliation checkpoints live in one
//! database file so a record write and its outbox append can commit in a
//! single transaction. All access goes through a mutex-guarded connection,
//! which serializes outbox operations (a stricter guarantee than the
//! required per-record serialization) while keeping callers free to run on
//! any thread.

use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Handle to the local database. Cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                model_type TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                changed_wall INTEGER NOT NULL,
                changed_logical INTEGER NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_records_model ON records(model_type);

            CREATE TABLE IF NOT EXISTS mutation_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                model_type TEXT NOT NULL,
                record_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                payload TEXT NOT NULL,
                base_version INTEGER NOT NULL,
                created_wall INTEGER NOT NULL,
                created_logical INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                not_before INTEGER,
                reason TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_outbox_record ON mutation_events(record_id, seq);
            CREATE INDEX IF NOT EXISTS idx_outbox_status ON mutation_events(status, seq);

            CREATE TABLE IF NOT EXISTS checkpoints (
                model_type TEXT PRIMARY KEY,
                position TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Runs `f` against the connection outside an explicit transaction
    /// (single statements are atomic on their own).
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. The all-or-nothing record-write + outbox-append contract is
    /// built on this.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().expect("database mutex poisoned");
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// Maps a rusqlite "no rows" result into `Option`.
pub(crate) fn optional<T>(
    result: Result<T, rusqlite::Error>,
) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
