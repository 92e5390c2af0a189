//! Transport layer abstraction.
//!
//! Defines the trait the orchestrator drives to push mutation events to the
//! remote backend and pull remote changes back. Wire format and protocol
//! specifics (GraphQL, REST, …) belong to the implementing client, not here.

use crate::error::TransportError;
use async_trait::async_trait;
use outpost_types::{HybridTimestamp, MutationEvent, Operation, Record, RecordId};
use serde::{Deserialize, Serialize};

/// The remote's acknowledgement of a delivered mutation, carrying the
/// version the backend assigned to the new state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAck {
    pub record_id: RecordId,
    pub version: u64,
}

/// One remote change reported by a reconciliation pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    pub record_id: RecordId,
    pub model_type: String,
    pub operation: Operation,
    /// The record data after the change.
    pub payload: serde_json::Value,
    /// The version the backend assigned to this state.
    pub version: u64,
    /// The version this change superseded, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
    pub changed_at: HybridTimestamp,
}

impl RemoteChange {
    /// The record state this change describes, ready for version-gated
    /// application to the local store.
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record {
            id: self.record_id.clone(),
            model_type: self.model_type.clone(),
            data: self.payload.clone(),
            version: self.version,
            last_changed_at: self.changed_at,
            deleted: self.operation == Operation::Delete,
        }
    }
}

/// One page of a reconciliation pull.
#[derive(Debug, Clone, Default)]
pub struct PullPage {
    /// Changes since the requested position, oldest first.
    pub changes: Vec<RemoteChange>,
    /// Cursor for the next page; `None` when the pull is exhausted.
    pub next: Option<String>,
}

/// A protocol client that can deliver mutations and report remote changes.
///
/// These are the only calls in the core allowed to suspend for unbounded
/// time; the orchestrator wraps each one in a per-call timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one mutation event to the remote.
    async fn send(&self, event: &MutationEvent) -> Result<RemoteAck, TransportError>;

    /// Pulls remote changes for a model type since an opaque cursor
    /// (`None` = from the beginning).
    async fn pull(
        &self,
        model_type: &str,
        since: Option<&str>,
    ) -> Result<PullPage, TransportError>;
}

/// A scriptable in-memory transport for testing.
pub mod mock {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Mock transport that records sent events and replays scripted
    /// responses.
    ///
    /// By default every send succeeds with an ack at `base version + 1` and
    /// every pull returns an empty, exhausted page. Failures and pull pages
    /// can be queued ahead of time.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        sent: Arc<Mutex<Vec<MutationEvent>>>,
        send_errors: Arc<Mutex<VecDeque<TransportError>>>,
        pages: Arc<Mutex<HashMap<String, VecDeque<PullPage>>>>,
        pulls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    }

    impl MockTransport {
        /// Creates a transport that accepts everything.
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues an error for the next send; subsequent sends succeed
        /// unless more errors are queued.
        pub fn fail_next_send(&self, error: TransportError) {
            self.send_errors.lock().unwrap().push_back(error);
        }

        /// Queues a pull page for a model type.
        pub fn queue_page(&self, model_type: &str, page: PullPage) {
            self.pages
                .lock()
                .unwrap()
                .entry(model_type.to_string())
                .or_default()
                .push_back(page);
        }

        /// Events delivered so far, in send order.
        pub fn sent(&self) -> Vec<MutationEvent> {
            self.sent.lock().unwrap().clone()
        }

        /// Pull calls observed so far, as `(model_type, cursor)` pairs.
        pub fn pulls(&self) -> Vec<(String, Option<String>)> {
            self.pulls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, event: &MutationEvent) -> Result<RemoteAck, TransportError> {
            if let Some(error) = self.send_errors.lock().unwrap().pop_front() {
                return Err(error);
            }
            self.sent.lock().unwrap().push(event.clone());
            Ok(RemoteAck {
                record_id: event.record_id.clone(),
                version: event.version + 1,
            })
        }

        async fn pull(
            &self,
            model_type: &str,
            since: Option<&str>,
        ) -> Result<PullPage, TransportError> {
            self.pulls
                .lock()
                .unwrap()
                .push((model_type.to_string(), since.map(str::to_string)));
            let page = self
                .pages
                .lock()
                .unwrap()
                .get_mut(model_type)
                .and_then(|queue| queue.pop_front());
            Ok(page.unwrap_or_default())
        }
    }
}
