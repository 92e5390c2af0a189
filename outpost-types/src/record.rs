//! The record — the unit of local persistence.

use crate::{HybridTimestamp, RecordId};
use serde::{Deserialize, Serialize};

/// A typed record held in the local store.
///
/// The `data` field holds arbitrary JSON whose structure is described by the
/// model schema for `model_type`. The version counter is advanced only when
/// the remote acknowledges or supplies a newer state; local edits move the
/// last-changed timestamp, not the version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub model_type: String,
    pub data: serde_json::Value,
    pub version: u64,
    pub last_changed_at: HybridTimestamp,
    /// Tombstone flag. Deleted records are kept so the outbox and
    /// reconciliation can still reason about them; they are never silently
    /// dropped.
    pub deleted: bool,
}

impl Record {
    /// Creates a new, never-synced record.
    #[must_use]
    pub fn new(model_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: RecordId::new(),
            model_type: model_type.into(),
            data,
            version: 0,
            last_changed_at: HybridTimestamp::now(),
            deleted: false,
        }
    }

    /// Creates a record with a caller-supplied id.
    #[must_use]
    pub fn with_id(
        id: RecordId,
        model_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id,
            model_type: model_type.into(),
            data,
            version: 0,
            last_changed_at: HybridTimestamp::now(),
            deleted: false,
        }
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/title").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value from `data` using a JSON pointer.
    pub fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.data.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value from `data` using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.data.pointer(pointer).and_then(|v| v.as_f64())
    }
}
