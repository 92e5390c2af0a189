//! Record model descriptors and sync expressions for Outpost.
//!
//! Defines the read-only metadata the sync core consumes:
//! - [`ModelSchema`] — a record type's fields, identity and ownership rules,
//!   built once at startup by the (external) schema system and passed by
//!   reference to all consumers
//! - [`SchemaRegistry`] — the set of registered model schemas for a session
//! - [`SyncExpression`] / [`SyncScope`] — per-model predicates restricting
//!   which records participate in remote synchronization
//!
//! Schemas validate outgoing payload shape only; authorization itself is
//! enforced server-side.

mod expression;
mod schema;

pub use expression::{Predicate, SyncExpression, SyncScope};
pub use schema::{
    AuthRule, AuthStrategy, FieldKind, ModelField, ModelSchema, SchemaRegistry,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised when a payload does not match its model schema.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no schema registered for model type: {0}")]
    UnknownModel(String),

    #[error("payload for {model_type} is not a JSON object")]
    NotAnObject { model_type: String },

    #[error("payload for {model_type} is missing required field: {field}")]
    MissingField { model_type: String, field: String },

    #[error("field {field} of {model_type} has the wrong type (expected {expected})")]
    WrongKind {
        model_type: String,
        field: String,
        expected: &'static str,
    },
}
