//! Conflict resolution between pending local mutations and remote changes.
//!
//! Reconciliation pairs a still-unretired outbox event with an incoming
//! remote change for the same record and classifies the pair. The ordering
//! matters: a plain stale-base resend must not be surfaced as a conflict,
//! and divergent history must never be resolved silently.

use outpost_types::MutationEvent;

use crate::transport::RemoteChange;

/// How an overlapping local event / remote change pair resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The remote state is strictly newer and reports having superseded
    /// exactly the version our mutation was based on. Apply the remote,
    /// retire the local event without sending it.
    AcceptRemote,

    /// The remote is at exactly our base version — it has not seen our
    /// concurrent edit. Rebase the event onto the remote version and resend.
    Rebase,

    /// Divergent history. Hold the event and surface the conflict for an
    /// explicit application decision.
    Surface,
}

/// Classifies a pending local event against an incoming remote change.
#[must_use]
pub fn classify(event: &MutationEvent, remote: &RemoteChange) -> Resolution {
    if remote.version > event.version && remote.supersedes == Some(event.version) {
        Resolution::AcceptRemote
    } else if remote.version == event.version {
        Resolution::Rebase
    } else {
        Resolution::Surface
    }
}

/// The application's answer to a surfaced conflict.
#[derive(Debug, Clone)]
pub enum ConflictDecision {
    /// Drop the local mutation and keep the remote state.
    AcceptRemote,
    /// Resend the local mutation rebased onto the remote version, so it
    /// supersedes the remote state.
    KeepLocal,
    /// Resend with a caller-merged payload in place of the original.
    Merge(serde_json::Value),
}
