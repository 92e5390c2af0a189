//! Durable mutation outbox for Outpost.
//!
//! Every local write is recorded as an ordered, replayable mutation event in
//! the same transaction as the record write itself. The outbox owns those
//! events until they are retired (confirmed by the remote) or dead-lettered,
//! and guarantees:
//!
//! - **Atomicity** — a failed enqueue leaves neither the record mutation nor
//!   the event observable (transactional rollback)
//! - **FIFO per record** — events for one record retire in creation order; a
//!   later event is never dispatched while an earlier one is unsettled
//! - **Crash safety** — events stranded in-flight by a crash return to
//!   pending on reopen and are eventually dispatched
//! - **Coalescing** — an update overwrites a still-undispatched event for the
//!   same record in place; a delete supersedes all earlier undispatched
//!   events while always keeping one send for the delete itself

mod outbox;

pub use outbox::MutationOutbox;
pub use outpost_storage::{EventStatus, StoredEvent};

/// Result type for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;

/// Errors that can occur in outbox operations.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    /// The underlying store failed; the triggering call saw a full rollback.
    #[error("persistence error: {0}")]
    Persistence(#[from] outpost_storage::StorageError),
}
