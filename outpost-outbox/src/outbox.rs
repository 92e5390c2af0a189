use crate::OutboxResult;
use outpost_storage::{outbox_store, record_store, Database, StoredEvent};
use outpost_types::{EventId, MutationEvent, Operation, Record, RecordId};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The durable queue of not-yet-confirmed local mutations.
///
/// All operations are serialized through the shared database connection, so
/// concurrent application writers and the background sync worker never
/// observe a half-applied queue transition.
#[derive(Clone, Debug)]
pub struct MutationOutbox {
    db: Database,
}

impl MutationOutbox {
    /// Opens the outbox over the shared database, recovering any entries a
    /// previous process left in-flight.
    pub fn open(db: Database) -> OutboxResult<Self> {
        let outbox = Self { db };
        let recovered = outbox
            .db
            .transaction(|tx| outbox_store::reset_in_flight(tx))?;
        if recovered > 0 {
            info!(recovered, "returned in-flight outbox entries to pending");
        }
        Ok(outbox)
    }

    /// Records a local mutation: writes the record and appends the event in
    /// one transaction. On failure neither is observable.
    ///
    /// Coalescing applies when the record already has undispatched events:
    /// an update folds into the newest pending event's payload (keeping that
    /// event's queue position and operation), and a delete removes every
    /// pending or held event before appending itself. In-flight events are
    /// never touched — once dispatch has begun an event is immutable.
    ///
    /// Returns the event that will carry this mutation, which for a
    /// coalesced update is the earlier event with the new payload.
    pub fn enqueue(&self, record: &Record, operation: Operation) -> OutboxResult<MutationEvent> {
        let mut stored = record.clone();
        if operation == Operation::Delete {
            stored.deleted = true;
        }
        let event = MutationEvent::for_record(&stored, operation);

        Ok(self.db.transaction(|tx| {
            record_store::save_record(tx, &stored)?;

            match operation {
                Operation::Delete => {
                    let collapsed = outbox_store::collapse_unretired(tx, &stored.id)?;
                    if collapsed > 0 {
                        debug!(
                            record_id = %stored.id,
                            collapsed,
                            "delete superseded earlier undispatched events"
                        );
                    }
                    outbox_store::insert_event(tx, &event)?;
                    Ok(event.clone())
                }
                Operation::Update => {
                    if let Some(prior) = outbox_store::newest_pending(tx, &stored.id)? {
                        if prior.event.operation != Operation::Delete {
                            outbox_store::update_payload(tx, &prior.event.id, &event.payload)?;
                            debug!(
                                record_id = %stored.id,
                                event_id = %prior.event.id,
                                "coalesced update into pending event"
                            );
                            let mut coalesced = prior.event;
                            coalesced.payload = event.payload.clone();
                            return Ok(coalesced);
                        }
                    }
                    outbox_store::insert_event(tx, &event)?;
                    Ok(event.clone())
                }
                Operation::Create => {
                    outbox_store::insert_event(tx, &event)?;
                    Ok(event.clone())
                }
            }
        })?)
    }

    /// Claims the oldest dispatch-eligible events, at most one per record,
    /// and marks them in-flight. Respects backoff deadlines and never hands
    /// out a second event for a record whose earlier event is unsettled.
    pub fn next_batch(&self, max_count: usize) -> OutboxResult<Vec<StoredEvent>> {
        let now = now_millis();
        Ok(self
            .db
            .transaction(|tx| outbox_store::claim_batch(tx, now, max_count))?)
    }

    /// Marks an event done and removes it. Idempotent — retiring an already
    /// retired event is a no-op.
    pub fn retire(&self, event_id: &EventId) -> OutboxResult<()> {
        use outpost_storage::EventStatus::{Held, InFlight, Pending};
        let removed = self
            .db
            .transaction(|tx| outbox_store::delete_event(tx, event_id, &[Pending, InFlight, Held]))?;
        if removed {
            debug!(event_id = %event_id, "retired outbox event");
        }
        Ok(())
    }

    /// Returns an in-flight event to pending after a transient failure,
    /// eligible again once `backoff` has elapsed.
    pub fn requeue(&self, event_id: &EventId, backoff: Duration) -> OutboxResult<bool> {
        let not_before = now_millis() + backoff.as_millis() as u64;
        let changed = self
            .db
            .transaction(|tx| outbox_store::requeue_event(tx, event_id, not_before))?;
        if changed {
            debug!(event_id = %event_id, backoff_ms = backoff.as_millis() as u64, "requeued event");
        }
        Ok(changed)
    }

    /// Returns a claimed event to pending without counting an attempt. Used
    /// when dispatch was abandoned (cooperative suspension, shutdown) rather
    /// than failed.
    pub fn unclaim(&self, event_id: &EventId) -> OutboxResult<bool> {
        Ok(self
            .db
            .transaction(|tx| outbox_store::unclaim_event(tx, event_id))?)
    }

    /// Moves an event to the terminal failed state. Never retried
    /// automatically; remains queryable via [`Self::dead_letters`] until
    /// cleared.
    pub fn dead_letter(&self, event_id: &EventId, reason: &str) -> OutboxResult<bool> {
        let changed = self
            .db
            .transaction(|tx| outbox_store::dead_letter_event(tx, event_id, reason))?;
        if changed {
            warn!(event_id = %event_id, reason, "dead-lettered outbox event");
        }
        Ok(changed)
    }

    /// Parks an event awaiting an explicit conflict decision. Held events
    /// block dispatch of later events for the same record.
    pub fn hold(&self, event_id: &EventId) -> OutboxResult<bool> {
        Ok(self
            .db
            .transaction(|tx| outbox_store::hold_event(tx, event_id))?)
    }

    /// Returns a held event to pending, optionally rebased onto a newer base
    /// version and/or carrying a replacement payload (merge decisions).
    pub fn release(
        &self,
        event_id: &EventId,
        base_version: Option<u64>,
        payload: Option<&str>,
    ) -> OutboxResult<bool> {
        Ok(self.db.transaction(|tx| {
            outbox_store::release_event(tx, event_id, base_version, payload)
        })?)
    }

    /// Rebases an event's base version in place (retry-with-rebase).
    pub fn rebase(&self, event_id: &EventId, version: u64) -> OutboxResult<bool> {
        Ok(self
            .db
            .transaction(|tx| outbox_store::rebase_event(tx, event_id, version))?)
    }

    /// The oldest unretired event for a record, if any. Reconciliation uses
    /// this to detect a local/remote conflict.
    pub fn oldest_unretired(&self, record_id: &RecordId) -> OutboxResult<Option<StoredEvent>> {
        Ok(self
            .db
            .with_conn(|conn| outbox_store::oldest_unretired(conn, record_id))?)
    }

    /// Number of events still owed to the remote (pending, in-flight or
    /// held).
    pub fn unretired_count(&self) -> OutboxResult<usize> {
        Ok(self.db.with_conn(outbox_store::unretired_count)?)
    }

    /// All dead-lettered events, oldest first.
    pub fn dead_letters(&self) -> OutboxResult<Vec<StoredEvent>> {
        Ok(self.db.with_conn(outbox_store::dead_letters)?)
    }

    /// Clears dead-lettered events. Returns how many were removed.
    pub fn clear_dead_letters(&self) -> OutboxResult<usize> {
        Ok(self
            .db
            .transaction(|tx| outbox_store::clear_dead_letters(tx))?)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
