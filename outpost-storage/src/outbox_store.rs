//! Row-level persistence for outbox entries.
//!
//! The outbox's queueing semantics (coalescing, batching, retry policy) live
//! in `outpost-outbox`; this module owns the SQL. All functions take a
//! connection so the outbox can run several of them inside one transaction.

use crate::database::optional;
use crate::error::{StorageError, StorageResult};
use outpost_types::{EventId, HybridTimestamp, MutationEvent, Operation, RecordId};
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

/// Lifecycle state of a stored outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Eligible for dispatch (possibly after a backoff deadline).
    Pending,
    /// Handed to the orchestrator; at most one per record.
    InFlight,
    /// Parked awaiting an explicit conflict decision.
    Held,
    /// Terminal failure; kept queryable until cleared.
    Dead,
}

impl EventStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Held => "held",
            Self::Dead => "dead",
        }
    }

    fn parse(s: &str) -> StorageResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_flight" => Ok(Self::InFlight),
            "held" => Ok(Self::Held),
            "dead" => Ok(Self::Dead),
            other => Err(StorageError::InvalidData(format!(
                "unknown event status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An outbox entry together with its queue state.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event: MutationEvent,
    pub status: EventStatus,
    pub attempts: u32,
    /// Earliest wall time (millis) the entry may be dispatched again.
    pub not_before: Option<u64>,
    /// Dead-letter reason, when terminal.
    pub reason: Option<String>,
}

fn stored_from_row(row: &Row<'_>) -> Result<StoredEvent, rusqlite::Error> {
    let id: String = row.get("id")?;
    let id = EventId::from_str(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let operation: String = row.get("operation")?;
    let operation = Operation::from_str(&operation).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: String = row.get("status")?;
    let status = EventStatus::parse(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(StoredEvent {
        event: MutationEvent {
            id,
            model_type: row.get("model_type")?,
            record_id: RecordId::from_string(row.get::<_, String>("record_id")?),
            operation,
            payload: row.get("payload")?,
            version: row.get::<_, i64>("base_version")? as u64,
            created_at: HybridTimestamp::new(
                row.get::<_, i64>("created_wall")? as u64,
                row.get::<_, i64>("created_logical")? as u32,
            ),
        },
        status,
        attempts: row.get::<_, i64>("attempts")? as u32,
        not_before: row.get::<_, Option<i64>>("not_before")?.map(|v| v as u64),
        reason: row.get("reason")?,
    })
}

const COLUMNS: &str = "id, model_type, record_id, operation, payload, base_version, \
                       created_wall, created_logical, status, attempts, not_before, reason";

/// Appends a new pending entry.
pub fn insert_event(conn: &Connection, event: &MutationEvent) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO mutation_events
            (id, model_type, record_id, operation, payload, base_version,
             created_wall, created_logical, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending')",
        params![
            event.id.to_string(),
            event.model_type,
            event.record_id.as_str(),
            event.operation.to_string(),
            event.payload,
            event.version as i64,
            event.created_at.wall_time() as i64,
            i64::from(event.created_at.logical()),
        ],
    )?;
    Ok(())
}

/// Fetches an entry by event id.
pub fn get_event(conn: &Connection, id: &EventId) -> StorageResult<Option<StoredEvent>> {
    optional(conn.query_row(
        &format!("SELECT {COLUMNS} FROM mutation_events WHERE id = ?1"),
        params![id.to_string()],
        stored_from_row,
    ))
}

/// The newest pending (not yet dispatched) entry for a record, if any.
/// Used by enqueue-time coalescing.
pub fn newest_pending(conn: &Connection, record_id: &RecordId) -> StorageResult<Option<StoredEvent>> {
    optional(conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM mutation_events
             WHERE record_id = ?1 AND status = 'pending'
             ORDER BY seq DESC LIMIT 1"
        ),
        params![record_id.as_str()],
        stored_from_row,
    ))
}

/// The oldest unretired (pending, in-flight or held) entry for a record.
pub fn oldest_unretired(
    conn: &Connection,
    record_id: &RecordId,
) -> StorageResult<Option<StoredEvent>> {
    optional(conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM mutation_events
             WHERE record_id = ?1 AND status IN ('pending', 'in_flight', 'held')
             ORDER BY seq ASC LIMIT 1"
        ),
        params![record_id.as_str()],
        stored_from_row,
    ))
}

/// Replaces an entry's payload in place (coalescing).
pub fn update_payload(conn: &Connection, id: &EventId, payload: &str) -> StorageResult<()> {
    conn.execute(
        "UPDATE mutation_events SET payload = ?2 WHERE id = ?1",
        params![id.to_string(), payload],
    )?;
    Ok(())
}

/// Removes every pending or held entry for a record. A newly enqueued delete
/// supersedes them; in-flight and dead entries are left alone.
pub fn collapse_unretired(conn: &Connection, record_id: &RecordId) -> StorageResult<usize> {
    let removed = conn.execute(
        "DELETE FROM mutation_events
         WHERE record_id = ?1 AND status IN ('pending', 'held')",
        params![record_id.as_str()],
    )?;
    Ok(removed)
}

/// Selects the oldest eligible pending entries and marks them in-flight.
///
/// At most one entry per record is claimed, a record with an in-flight or
/// held entry contributes nothing (later events must wait for the earlier
/// one to settle), and entries whose backoff deadline is still in the future
/// are skipped.
pub fn claim_batch(
    conn: &Connection,
    now_millis: u64,
    max: usize,
) -> StorageResult<Vec<StoredEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM mutation_events e
         WHERE e.status = 'pending'
           AND (e.not_before IS NULL OR e.not_before <= ?1)
           AND NOT EXISTS (
               SELECT 1 FROM mutation_events f
               WHERE f.record_id = e.record_id AND f.status IN ('in_flight', 'held'))
           AND e.seq = (
               SELECT MIN(p.seq) FROM mutation_events p
               WHERE p.record_id = e.record_id AND p.status = 'pending')
         ORDER BY e.seq ASC
         LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![now_millis as i64, max as i64], stored_from_row)?;

    let mut batch = Vec::new();
    for row in rows {
        batch.push(row?);
    }
    drop(stmt);

    for entry in &mut batch {
        conn.execute(
            "UPDATE mutation_events SET status = 'in_flight' WHERE id = ?1",
            params![entry.event.id.to_string()],
        )?;
        entry.status = EventStatus::InFlight;
    }
    Ok(batch)
}

/// Deletes an entry if its status is one of `from`. Returns whether a row
/// was removed.
pub fn delete_event(
    conn: &Connection,
    id: &EventId,
    from: &[EventStatus],
) -> StorageResult<bool> {
    let statuses = status_list(from);
    let removed = conn.execute(
        &format!("DELETE FROM mutation_events WHERE id = ?1 AND status IN ({statuses})"),
        params![id.to_string()],
    )?;
    Ok(removed > 0)
}

/// Returns an in-flight entry to pending without counting an attempt. Used
/// when a claimed entry's dispatch was abandoned (suspension, shutdown)
/// rather than failed.
pub fn unclaim_event(conn: &Connection, id: &EventId) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events SET status = 'pending' WHERE id = ?1 AND status = 'in_flight'",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Returns an in-flight entry to pending with a backoff deadline, counting
/// the attempt.
pub fn requeue_event(conn: &Connection, id: &EventId, not_before: u64) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events
         SET status = 'pending', attempts = attempts + 1, not_before = ?2
         WHERE id = ?1 AND status = 'in_flight'",
        params![id.to_string(), not_before as i64],
    )?;
    Ok(changed > 0)
}

/// Moves an entry to the terminal dead state with a reason.
pub fn dead_letter_event(conn: &Connection, id: &EventId, reason: &str) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events SET status = 'dead', reason = ?2
         WHERE id = ?1 AND status IN ('pending', 'in_flight', 'held')",
        params![id.to_string(), reason],
    )?;
    Ok(changed > 0)
}

/// Parks an entry awaiting a conflict decision.
pub fn hold_event(conn: &Connection, id: &EventId) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events SET status = 'held'
         WHERE id = ?1 AND status IN ('pending', 'in_flight')",
        params![id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Returns a held entry to pending, optionally rebasing its base version
/// and replacing its payload.
pub fn release_event(
    conn: &Connection,
    id: &EventId,
    base_version: Option<u64>,
    payload: Option<&str>,
) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events
         SET status = 'pending',
             not_before = NULL,
             base_version = COALESCE(?2, base_version),
             payload = COALESCE(?3, payload)
         WHERE id = ?1 AND status = 'held'",
        params![id.to_string(), base_version.map(|v| v as i64), payload],
    )?;
    Ok(changed > 0)
}

/// Rebases an entry's base version and clears its backoff deadline so the
/// resend happens promptly (retry-with-rebase conflict outcome).
pub fn rebase_event(conn: &Connection, id: &EventId, version: u64) -> StorageResult<bool> {
    let changed = conn.execute(
        "UPDATE mutation_events SET base_version = ?2, not_before = NULL
         WHERE id = ?1 AND status IN ('pending', 'in_flight')",
        params![id.to_string(), version as i64],
    )?;
    Ok(changed > 0)
}

/// Number of entries still owed to the remote (pending, in-flight or held).
pub fn unretired_count(conn: &Connection) -> StorageResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM mutation_events WHERE status IN ('pending', 'in_flight', 'held')",
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// All dead-lettered entries, oldest first.
pub fn dead_letters(conn: &Connection) -> StorageResult<Vec<StoredEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM mutation_events WHERE status = 'dead' ORDER BY seq ASC"
    ))?;
    let rows = stmt.query_map([], stored_from_row)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Removes all dead-lettered entries. Returns how many were cleared.
pub fn clear_dead_letters(conn: &Connection) -> StorageResult<usize> {
    let removed = conn.execute("DELETE FROM mutation_events WHERE status = 'dead'", [])?;
    Ok(removed)
}

/// Returns entries stranded in-flight by a crash to pending.
pub fn reset_in_flight(conn: &Connection) -> StorageResult<usize> {
    let changed = conn.execute(
        "UPDATE mutation_events SET status = 'pending' WHERE status = 'in_flight'",
        [],
    )?;
    Ok(changed)
}

fn status_list(statuses: &[EventStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}
