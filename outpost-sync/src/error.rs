//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors returned by transport calls.
///
/// The orchestrator maps these onto outbox transitions: transient failures
/// and timeouts requeue with backoff, rejections dead-letter, and an
/// invalidated authentication suspends the whole session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network trouble or rate limiting — retried with backoff.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// The call exceeded its deadline. A timeout is transient, not terminal.
    #[error("transport call timed out")]
    Timeout,

    /// The remote rejected the payload (validation or authorization).
    /// Dead-lettered, never auto-retried.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Authentication is no longer valid; the session must suspend until
    /// explicitly resumed.
    #[error("authentication invalidated: {0}")]
    Unauthenticated(String),
}

/// Errors that can occur in sync orchestration.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Outbox failure.
    #[error("outbox error: {0}")]
    Outbox(#[from] outpost_outbox::OutboxError),

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] outpost_storage::StorageError),

    /// Payload did not match its model schema.
    #[error("model error: {0}")]
    Model(#[from] outpost_model::ModelError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The orchestrator is gone.
    #[error("channel closed")]
    ChannelClosed,
}
