//! Process-wide broadcast of mutation outcomes.
//!
//! Built on a bounded `tokio::sync::broadcast` channel: publishing never
//! blocks and never fails the pipeline. A subscriber that falls behind loses
//! its oldest events (it sees a `Lagged` error from the receiver) without
//! affecting other subscribers or outbox drainage.

use outpost_types::{EventId, MutationEvent, Record, RecordId};
use tokio::sync::broadcast;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataEventKind {
    /// A local write was committed and queued for sync.
    LocalSaved,
    /// A local delete was committed and queued for sync.
    LocalDeleted,
    /// A remote change was applied to the local store.
    RemoteApplied,
    /// A remote change won over a pending local mutation (a superseding
    /// remote state or an explicit accept-remote decision).
    MergedRemote,
    /// A pending local mutation diverged from the remote and awaits an
    /// explicit decision.
    Conflict,
    /// A mutation event reached its terminal failed state.
    DeadLettered,
}

/// A mutation outcome delivered to subscribers.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub model_type: String,
    pub record_id: RecordId,
    /// Snapshot of the record data the outcome refers to, when available.
    pub data: Option<serde_json::Value>,
    pub version: u64,
    /// The outbox event involved, for `Conflict` and `DeadLettered`.
    pub event_id: Option<EventId>,
    /// Dead-letter reason.
    pub reason: Option<String>,
}

impl DataEvent {
    pub(crate) fn local(kind: DataEventKind, record: &Record) -> Self {
        Self {
            kind,
            model_type: record.model_type.clone(),
            record_id: record.id.clone(),
            data: Some(record.data.clone()),
            version: record.version,
            event_id: None,
            reason: None,
        }
    }

    pub(crate) fn remote(kind: DataEventKind, record: &Record) -> Self {
        Self::local(kind, record)
    }

    pub(crate) fn conflict(event: &MutationEvent, remote_version: u64) -> Self {
        Self {
            kind: DataEventKind::Conflict,
            model_type: event.model_type.clone(),
            record_id: event.record_id.clone(),
            data: event.payload_json().ok(),
            version: remote_version,
            event_id: Some(event.id),
            reason: None,
        }
    }

    pub(crate) fn dead_lettered(event: &MutationEvent, reason: &str) -> Self {
        Self {
            kind: DataEventKind::DeadLettered,
            model_type: event.model_type.clone(),
            record_id: event.record_id.clone(),
            data: event.payload_json().ok(),
            version: event.version,
            event_id: Some(event.id),
            reason: Some(reason.to_string()),
        }
    }
}

/// Fire-and-forget broadcaster of [`DataEvent`]s.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: broadcast::Sender<DataEvent>,
}

impl EventPublisher {
    /// Creates a publisher whose subscribers each buffer up to `capacity`
    /// undelivered events before lagging.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to mutation outcomes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes an outcome. Never blocks; with no subscribers the event is
    /// simply dropped.
    pub fn publish(&self, event: DataEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
