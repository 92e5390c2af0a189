//! Background sync orchestration for Outpost.
//!
//! Connects the durable mutation outbox to a remote backend: a single worker
//! task drains locally recorded mutations outward, pulls remote changes back
//! inward, and reconciles the two without ever blocking the application's
//! write path.
//!
//! # Components
//!
//! - **[`DataStore`]**: the application-facing write path — save/delete
//!   commit locally and enqueue, reads never touch the network
//! - **[`Transport`]**: the seam to the protocol client doing the actual
//!   network I/O; [`transport::mock`] provides a scriptable test double
//! - **[`SyncOrchestrator`]**: the session state machine
//!   (`Idle → Draining → Reconciling → Idle`, with cooperative `Suspended`)
//! - **[`resolver`]**: the ordered conflict policy between pending local
//!   mutations and incoming remote changes
//! - **[`EventPublisher`]**: non-blocking broadcast of mutation outcomes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use outpost_model::{ModelField, ModelSchema, SchemaRegistry, SyncScope};
//! use outpost_storage::{CheckpointStore, Database};
//! use outpost_sync::transport::mock::MockTransport;
//! use outpost_sync::{DataStore, EventPublisher, OrchestratorConfig, SyncOrchestrator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open("outpost.db")?;
//! let registry = SchemaRegistry::new();
//! registry.register(ModelSchema::new("note", vec![ModelField::string("title", true)]));
//!
//! let publisher = EventPublisher::default();
//! let store = DataStore::open(db.clone(), registry.clone(), publisher.clone())?;
//!
//! let handle = SyncOrchestrator::spawn(
//!     OrchestratorConfig::default(),
//!     store.records().clone(),
//!     store.outbox().clone(),
//!     CheckpointStore::new(db),
//!     registry,
//!     SyncScope::unrestricted(),
//!     Arc::new(MockTransport::new()),
//!     publisher,
//! );
//! # drop(handle);
//! # Ok(())
//! # }
//! ```

mod datastore;
mod error;
mod orchestrator;
mod publisher;
pub mod resolver;
pub mod transport;

pub use datastore::DataStore;
pub use error::{SyncError, SyncResult, TransportError};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorHandle, SyncCommand, SyncOrchestrator, SyncPhase,
};
pub use publisher::{DataEvent, DataEventKind, EventPublisher};
pub use resolver::{ConflictDecision, Resolution};
pub use transport::{PullPage, RemoteAck, RemoteChange, Transport};
