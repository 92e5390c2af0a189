//! Core type definitions for Outpost.
//!
//! This crate defines the fundamental, model-agnostic types used throughout
//! the local data layer:
//! - Record and event identifiers
//! - Hybrid Logical Clock timestamps
//! - Records (the unit of local persistence)
//! - Mutation events (the unit of replication in the outbox)
//!
//! All domain-specific record shapes (notes, tasks, posts, etc.) are described
//! by model schemas in `outpost-model`, not here.

mod event;
mod ids;
mod record;
mod timestamp;

pub use event::{MutationEvent, Operation};
pub use ids::{EventId, RecordId};
pub use record::Record;
pub use timestamp::HybridTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
