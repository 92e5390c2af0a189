//! The background sync state machine.
//!
//! One worker task drives the session through
//! `Idle → Draining → Reconciling → Idle`, with `Suspended` as the error
//! path for invalidated authentication and the target of an explicit
//! suspend. Draining and reconciliation alternate in bounded slices so
//! sustained local write load cannot starve reconciliation.
//!
//! Transport calls are the only operations allowed to suspend for unbounded
//! time; each is wrapped in a per-call timeout. Suspension is cooperative:
//! commands are processed between dispatches, never mid-send.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use outpost_model::{SchemaRegistry, SyncScope};
use outpost_outbox::{MutationOutbox, StoredEvent};
use outpost_storage::{CheckpointStore, RecordStore};
use outpost_types::{EventId, MutationEvent, Operation, Record};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult, TransportError};
use crate::publisher::{DataEvent, DataEventKind, EventPublisher};
use crate::resolver::{self, ConflictDecision, Resolution};
use crate::transport::{RemoteChange, Transport};

/// The session state machine's phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Draining,
    Reconciling,
    Suspended,
}

/// Commands the application layer can send to a running session.
#[derive(Debug)]
pub enum SyncCommand {
    /// Park the session; in-flight work settles first.
    Suspend,
    /// Return a suspended session to draining.
    Resume,
    /// Answer a surfaced conflict.
    ResolveConflict {
        event_id: EventId,
        decision: ConflictDecision,
    },
    /// Stop the worker.
    Shutdown,
}

/// Tuning knobs for a sync session.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum events claimed per outbox batch.
    pub batch_size: usize,
    /// Batches drained before yielding to reconciliation.
    pub drain_slice: usize,
    /// Per-call deadline for transport sends and pulls.
    pub send_timeout: Duration,
    /// Transient failures tolerated per event before dead-lettering.
    pub retry_budget: u32,
    /// First retry backoff; doubles per attempt.
    pub backoff_base: Duration,
    /// Upper bound on the retry backoff.
    pub backoff_cap: Duration,
    /// How long an idle session sleeps before checking for work.
    pub idle_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            drain_slice: 4,
            send_timeout: Duration::from_secs(10),
            retry_budget: 5,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(60),
            idle_poll: Duration::from_secs(1),
        }
    }
}

/// Handle to a running sync session.
///
/// Dropping the handle shuts the worker down once it next checks for
/// commands.
pub struct OrchestratorHandle {
    commands: mpsc::Sender<SyncCommand>,
    phase: watch::Receiver<SyncPhase>,
    task: tokio::task::JoinHandle<()>,
}

impl OrchestratorHandle {
    /// The session's current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// A watch receiver for observing phase transitions.
    pub fn phase_changes(&self) -> watch::Receiver<SyncPhase> {
        self.phase.clone()
    }

    /// Parks the session until [`Self::resume`].
    pub async fn suspend(&self) -> SyncResult<()> {
        self.send(SyncCommand::Suspend).await
    }

    /// Returns a suspended session to draining.
    pub async fn resume(&self) -> SyncResult<()> {
        self.send(SyncCommand::Resume).await
    }

    /// Answers a conflict previously surfaced through the publisher.
    pub async fn resolve_conflict(
        &self,
        event_id: EventId,
        decision: ConflictDecision,
    ) -> SyncResult<()> {
        self.send(SyncCommand::ResolveConflict { event_id, decision })
            .await
    }

    /// Stops the worker and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SyncCommand::Shutdown).await;
        let _ = self.task.await;
    }

    async fn send(&self, command: SyncCommand) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Flow {
    Continue,
    Stop,
}

/// The background worker driving one sync session.
pub struct SyncOrchestrator {
    config: OrchestratorConfig,
    records: RecordStore,
    outbox: MutationOutbox,
    checkpoints: CheckpointStore,
    registry: SchemaRegistry,
    scope: SyncScope,
    transport: Arc<dyn Transport>,
    publisher: EventPublisher,
    commands: mpsc::Receiver<SyncCommand>,
    phase_tx: watch::Sender<SyncPhase>,
    /// Remote sides of surfaced conflicts, keyed by the held event. Never
    /// persisted; a restart re-surfaces the conflict from the held outbox
    /// entry on the next overlapping pull.
    conflicts: HashMap<EventId, RemoteChange>,
    /// Events dispatched in the last drain slice, for phase scheduling.
    drained: usize,
}

impl SyncOrchestrator {
    /// Spawns the session worker on the current tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        config: OrchestratorConfig,
        records: RecordStore,
        outbox: MutationOutbox,
        checkpoints: CheckpointStore,
        registry: SchemaRegistry,
        scope: SyncScope,
        transport: Arc<dyn Transport>,
        publisher: EventPublisher,
    ) -> OrchestratorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (phase_tx, phase_rx) = watch::channel(SyncPhase::Idle);

        let orchestrator = Self {
            config,
            records,
            outbox,
            checkpoints,
            registry,
            scope,
            transport,
            publisher,
            commands: cmd_rx,
            phase_tx,
            conflicts: HashMap::new(),
            drained: 0,
        };
        let task = tokio::spawn(orchestrator.run());

        OrchestratorHandle {
            commands: cmd_tx,
            phase: phase_rx,
            task,
        }
    }

    async fn run(mut self) {
        info!("sync session started");
        loop {
            if self.pump_commands() == Flow::Stop {
                break;
            }
            match self.phase() {
                SyncPhase::Suspended => match self.commands.recv().await {
                    Some(command) => {
                        if self.handle_command(command) == Flow::Stop {
                            break;
                        }
                    }
                    None => break,
                },
                SyncPhase::Idle => {
                    tokio::select! {
                        command = self.commands.recv() => match command {
                            Some(command) => {
                                if self.handle_command(command) == Flow::Stop {
                                    break;
                                }
                            }
                            None => break,
                        },
                        () = tokio::time::sleep(self.config.idle_poll) => {
                            self.set_phase(SyncPhase::Draining);
                        }
                    }
                }
                SyncPhase::Draining => {
                    if self.drain_slice().await == Flow::Stop {
                        break;
                    }
                    if self.phase() == SyncPhase::Draining {
                        self.set_phase(SyncPhase::Reconciling);
                    }
                }
                SyncPhase::Reconciling => {
                    let (flow, applied) = self.reconcile_round().await;
                    if flow == Flow::Stop {
                        break;
                    }
                    if self.phase() == SyncPhase::Reconciling {
                        if self.drained > 0 || applied > 0 {
                            self.set_phase(SyncPhase::Draining);
                        } else {
                            self.set_phase(SyncPhase::Idle);
                        }
                    }
                }
            }
        }
        info!("sync session stopped");
    }

    fn phase(&self) -> SyncPhase {
        *self.phase_tx.borrow()
    }

    fn set_phase(&self, phase: SyncPhase) {
        if self.phase() != phase {
            debug!(?phase, "sync phase transition");
            let _ = self.phase_tx.send(phase);
        }
    }

    fn pump_commands(&mut self) -> Flow {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if self.handle_command(command) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => return Flow::Continue,
                Err(mpsc::error::TryRecvError::Disconnected) => return Flow::Stop,
            }
        }
    }

    fn handle_command(&mut self, command: SyncCommand) -> Flow {
        match command {
            SyncCommand::Suspend => {
                info!("sync session suspended");
                self.set_phase(SyncPhase::Suspended);
            }
            SyncCommand::Resume => {
                if self.phase() == SyncPhase::Suspended {
                    info!("sync session resumed");
                    self.set_phase(SyncPhase::Draining);
                }
            }
            SyncCommand::ResolveConflict { event_id, decision } => {
                self.apply_decision(event_id, &decision);
            }
            SyncCommand::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    // ── Draining ─────────────────────────────────────────────────

    async fn drain_slice(&mut self) -> Flow {
        self.drained = 0;
        for _ in 0..self.config.drain_slice {
            let batch = match self.outbox.next_batch(self.config.batch_size) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "failed to claim outbox batch");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }

            let mut entries = batch.into_iter();
            while let Some(entry) = entries.next() {
                if self.pump_commands() == Flow::Stop {
                    self.unclaim_rest(entry, entries);
                    return Flow::Stop;
                }
                if self.phase() == SyncPhase::Suspended {
                    self.unclaim_rest(entry, entries);
                    return Flow::Continue;
                }
                self.dispatch(entry).await;
                self.drained += 1;
            }
        }
        Flow::Continue
    }

    /// Hands claimed-but-undispatched entries back to the queue.
    fn unclaim_rest(&self, first: StoredEvent, rest: impl Iterator<Item = StoredEvent>) {
        for entry in std::iter::once(first).chain(rest) {
            if let Err(e) = self.outbox.unclaim(&entry.event.id) {
                warn!(event_id = %entry.event.id, error = %e, "failed to unclaim entry");
            }
        }
    }

    async fn dispatch(&mut self, entry: StoredEvent) {
        let attempts = entry.attempts;
        let event = entry.event;

        // Outgoing payload must have the shape the model schema declares.
        if let Some(schema) = self.registry.get(&event.model_type) {
            let shape = event
                .payload_json()
                .map_err(|e| e.to_string())
                .and_then(|json| schema.validate_payload(&json).map_err(|e| e.to_string()));
            if let Err(reason) = shape {
                self.fail_terminal(&event, &reason);
                return;
            }
        }

        if !self.scope.in_scope(&scope_record(&event)) {
            debug!(record_id = %event.record_id, "event out of sync scope, retired unsent");
            if let Err(e) = self.outbox.retire(&event.id) {
                warn!(event_id = %event.id, error = %e, "failed to retire out-of-scope event");
            }
            return;
        }

        let sent = tokio::time::timeout(self.config.send_timeout, self.transport.send(&event));
        match sent.await {
            Ok(Ok(ack)) => {
                if let Err(e) = self.records.apply_ack(&ack.record_id, ack.version) {
                    warn!(record_id = %ack.record_id, error = %e, "failed to apply ack version");
                }
                if let Err(e) = self.outbox.retire(&event.id) {
                    warn!(event_id = %event.id, error = %e, "failed to retire acknowledged event");
                }
                debug!(record_id = %event.record_id, version = ack.version, "mutation acknowledged");
            }
            Ok(Err(TransportError::Rejected(reason))) => self.fail_terminal(&event, &reason),
            Ok(Err(TransportError::Unauthenticated(reason))) => {
                warn!(%reason, "authentication invalidated, suspending sync");
                if let Err(e) = self.outbox.unclaim(&event.id) {
                    warn!(event_id = %event.id, error = %e, "failed to unclaim entry");
                }
                self.set_phase(SyncPhase::Suspended);
            }
            Ok(Err(error @ (TransportError::Transient(_) | TransportError::Timeout))) => {
                self.fail_transient(&event, attempts, &error.to_string());
            }
            Err(_elapsed) => self.fail_transient(&event, attempts, "send timed out"),
        }
    }

    fn fail_terminal(&self, event: &MutationEvent, reason: &str) {
        match self.outbox.dead_letter(&event.id, reason) {
            Ok(true) => self.publisher.publish(DataEvent::dead_lettered(event, reason)),
            Ok(false) => {}
            Err(e) => warn!(event_id = %event.id, error = %e, "failed to dead-letter event"),
        }
    }

    fn fail_transient(&self, event: &MutationEvent, attempts: u32, reason: &str) {
        if attempts + 1 >= self.config.retry_budget {
            self.fail_terminal(event, &format!("retry budget exhausted: {reason}"));
        } else {
            let backoff = self.backoff_for(attempts);
            debug!(
                event_id = %event.id,
                attempts = attempts + 1,
                backoff_ms = backoff.as_millis() as u64,
                reason,
                "transient send failure, requeued"
            );
            if let Err(e) = self.outbox.requeue(&event.id, backoff) {
                warn!(event_id = %event.id, error = %e, "failed to requeue event");
            }
        }
    }

    fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts.min(16)).unwrap_or(u32::MAX);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_cap)
    }

    // ── Reconciling ──────────────────────────────────────────────

    async fn reconcile_round(&mut self) -> (Flow, usize) {
        let mut applied = 0;
        for model_type in self.registry.model_types() {
            let mut position = match self.checkpoints.get(&model_type) {
                Ok(checkpoint) => checkpoint.map(|c| c.position),
                Err(e) => {
                    warn!(model_type = %model_type, error = %e, "failed to load checkpoint");
                    continue;
                }
            };

            loop {
                if self.pump_commands() == Flow::Stop {
                    return (Flow::Stop, applied);
                }
                if self.phase() == SyncPhase::Suspended {
                    return (Flow::Continue, applied);
                }

                let pulled = tokio::time::timeout(
                    self.config.send_timeout,
                    self.transport.pull(&model_type, position.as_deref()),
                );
                let page = match pulled.await {
                    Ok(Ok(page)) => page,
                    Ok(Err(TransportError::Unauthenticated(reason))) => {
                        warn!(%reason, "authentication invalidated, suspending sync");
                        self.set_phase(SyncPhase::Suspended);
                        return (Flow::Continue, applied);
                    }
                    Ok(Err(e)) => {
                        debug!(model_type = %model_type, error = %e, "pull failed, retrying next round");
                        break;
                    }
                    Err(_elapsed) => {
                        debug!(model_type = %model_type, "pull timed out, retrying next round");
                        break;
                    }
                };

                for change in &page.changes {
                    if self.apply_remote_change(change) {
                        applied += 1;
                    }
                }

                match page.next {
                    Some(next) => {
                        // Durable progress before requesting more; a crash
                        // here re-applies this page as version-gated no-ops.
                        if let Err(e) = self.checkpoints.put(&model_type, &next) {
                            warn!(model_type = %model_type, error = %e, "failed to persist checkpoint");
                            break;
                        }
                        let caught_up = position.as_deref() == Some(next.as_str());
                        position = Some(next);
                        if caught_up {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
        (Flow::Continue, applied)
    }

    /// Applies one remote change, returning whether local state moved.
    fn apply_remote_change(&mut self, change: &RemoteChange) -> bool {
        let incoming = change.to_record();
        if !self.scope.in_scope(&incoming) {
            debug!(record_id = %change.record_id, "remote change out of sync scope, skipped");
            return false;
        }

        let pending = match self.outbox.oldest_unretired(&change.record_id) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(record_id = %change.record_id, error = %e, "failed to check outbox");
                return false;
            }
        };

        match pending {
            Some(entry) => self.resolve_against_pending(entry, change, incoming),
            None => match self.records.apply_remote(&incoming) {
                Ok(true) => {
                    self.publisher
                        .publish(DataEvent::remote(DataEventKind::RemoteApplied, &incoming));
                    true
                }
                Ok(false) => false,
                Err(e) => {
                    warn!(record_id = %change.record_id, error = %e, "failed to apply remote change");
                    false
                }
            },
        }
    }

    fn resolve_against_pending(
        &mut self,
        entry: StoredEvent,
        change: &RemoteChange,
        incoming: Record,
    ) -> bool {
        let event = entry.event;
        match resolver::classify(&event, change) {
            Resolution::AcceptRemote => match self.records.apply_remote(&incoming) {
                Ok(applied) => {
                    if let Err(e) = self.outbox.retire(&event.id) {
                        warn!(event_id = %event.id, error = %e, "failed to retire merged event");
                    }
                    debug!(record_id = %event.record_id, "remote version won, local mutation retired unsent");
                    self.publisher
                        .publish(DataEvent::remote(DataEventKind::MergedRemote, &incoming));
                    applied
                }
                Err(e) => {
                    warn!(record_id = %event.record_id, error = %e, "failed to apply winning remote");
                    false
                }
            },
            Resolution::Rebase => {
                match self.outbox.rebase(&event.id, change.version) {
                    Ok(true) => {
                        debug!(event_id = %event.id, version = change.version, "rebased pending mutation for resend");
                    }
                    Ok(false) => {}
                    Err(e) => warn!(event_id = %event.id, error = %e, "failed to rebase event"),
                }
                false
            }
            Resolution::Surface => {
                match self.outbox.hold(&event.id) {
                    Ok(fresh) => {
                        self.conflicts.insert(event.id, change.clone());
                        if fresh {
                            info!(record_id = %event.record_id, "conflict surfaced, awaiting decision");
                            self.publisher.publish(DataEvent::conflict(&event, change.version));
                        }
                    }
                    Err(e) => warn!(event_id = %event.id, error = %e, "failed to hold conflicted event"),
                }
                false
            }
        }
    }

    // ── Conflict decisions ───────────────────────────────────────

    fn apply_decision(&mut self, event_id: EventId, decision: &ConflictDecision) {
        let remote = self.conflicts.remove(&event_id);
        match decision {
            ConflictDecision::AcceptRemote => {
                if let Some(change) = &remote {
                    let incoming = change.to_record();
                    match self.records.apply_remote(&incoming) {
                        Ok(true) => self
                            .publisher
                            .publish(DataEvent::remote(DataEventKind::MergedRemote, &incoming)),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(record_id = %change.record_id, error = %e, "failed to apply accepted remote");
                        }
                    }
                }
                if let Err(e) = self.outbox.retire(&event_id) {
                    warn!(event_id = %event_id, error = %e, "failed to retire decided event");
                }
            }
            ConflictDecision::KeepLocal => {
                let base = remote.as_ref().map(|r| r.version);
                match self.outbox.release(&event_id, base, None) {
                    Ok(true) => debug!(event_id = %event_id, "kept local mutation, released for resend"),
                    Ok(false) => debug!(event_id = %event_id, "no held event for decision"),
                    Err(e) => warn!(event_id = %event_id, error = %e, "failed to release held event"),
                }
            }
            ConflictDecision::Merge(payload) => {
                let base = remote.as_ref().map(|r| r.version);
                let payload = payload.to_string();
                match self.outbox.release(&event_id, base, Some(&payload)) {
                    Ok(true) => debug!(event_id = %event_id, "merged payload released for resend"),
                    Ok(false) => debug!(event_id = %event_id, "no held event for decision"),
                    Err(e) => warn!(event_id = %event_id, error = %e, "failed to release merged event"),
                }
            }
        }
    }
}

/// The record view of an outbox event, for scope evaluation.
fn scope_record(event: &MutationEvent) -> Record {
    Record {
        id: event.record_id.clone(),
        model_type: event.model_type.clone(),
        data: event.payload_json().unwrap_or(serde_json::Value::Null),
        version: event.version,
        last_changed_at: event.created_at,
        deleted: event.operation == Operation::Delete,
    }
}
