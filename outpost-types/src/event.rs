//! Mutation events — the unit of replication in the outbox.
//!
//! Every local write is recorded as an immutable, append-only mutation event.
//! Events for the same record retire in creation order (FIFO per record); a
//! later event for a record is never sent before an earlier unretired one.

use crate::{EventId, HybridTimestamp, Record, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of local write a mutation event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Operation {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(crate::Error::InvalidOperation(other.to_string())),
        }
    }
}

/// An event representing one local mutation awaiting remote delivery.
///
/// The payload is the JSON snapshot of the record's data at enqueue time.
/// `version` is the base version — the last version the device had applied
/// when the mutation was made — which the conflict resolver compares against
/// incoming remote versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Unique identifier for this event.
    pub id: EventId,

    /// The model type of the mutated record.
    pub model_type: String,

    /// The record this event applies to.
    pub record_id: RecordId,

    /// The kind of mutation.
    pub operation: Operation,

    /// JSON snapshot of the record data at enqueue time.
    pub payload: String,

    /// The record version this mutation is based on.
    pub version: u64,

    /// When this event was created.
    pub created_at: HybridTimestamp,
}

impl MutationEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(
        model_type: impl Into<String>,
        record_id: RecordId,
        operation: Operation,
        payload: impl Into<String>,
        version: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            model_type: model_type.into(),
            record_id,
            operation,
            payload: payload.into(),
            version,
            created_at: HybridTimestamp::now(),
        }
    }

    /// Builds the event describing a mutation of `record`.
    ///
    /// The payload snapshots the record's current data; the base version is
    /// the record's current version.
    #[must_use]
    pub fn for_record(record: &Record, operation: Operation) -> Self {
        Self::new(
            record.model_type.clone(),
            record.id.clone(),
            operation,
            record.data.to_string(),
            record.version,
        )
    }

    /// Parses the payload back into JSON.
    pub fn payload_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
