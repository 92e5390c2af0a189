//! The application-facing write path.
//!
//! Wraps the record store and mutation outbox behind save/delete/query calls
//! that commit locally, enqueue the mutation for sync, and publish the local
//! outcome — all without ever touching the network. Storage failures surface
//! synchronously to the caller with the record and event rolled back
//! together.

use std::sync::{Arc, Mutex};

use outpost_model::SchemaRegistry;
use outpost_outbox::MutationOutbox;
use outpost_storage::{Database, RecordStore};
use outpost_types::{HybridTimestamp, Operation, Record, RecordId};
use tracing::debug;

use crate::error::SyncResult;
use crate::publisher::{DataEvent, DataEventKind, EventPublisher};

/// Local reads and writes over the synced partition.
///
/// Cheap to clone; clones share the database, outbox and publisher.
#[derive(Clone)]
pub struct DataStore {
    records: RecordStore,
    outbox: MutationOutbox,
    registry: SchemaRegistry,
    publisher: EventPublisher,
    clock: Arc<Mutex<HybridTimestamp>>,
}

impl DataStore {
    /// Opens the data store over a shared database, recovering any outbox
    /// entries a previous process left in-flight.
    pub fn open(
        db: Database,
        registry: SchemaRegistry,
        publisher: EventPublisher,
    ) -> SyncResult<Self> {
        let outbox = MutationOutbox::open(db.clone())?;
        Ok(Self {
            records: RecordStore::new(db),
            outbox,
            registry,
            publisher,
            clock: Arc::new(Mutex::new(HybridTimestamp::now())),
        })
    }

    /// Saves a record: validates the payload against its model schema,
    /// commits the record together with its outbox event, and publishes
    /// `LocalSaved`.
    ///
    /// Passing an `id` updates that record (or creates it with the given id
    /// if absent); passing `None` creates a record with a fresh id.
    pub fn save(
        &self,
        model_type: &str,
        id: Option<RecordId>,
        data: serde_json::Value,
    ) -> SyncResult<Record> {
        self.registry.validate(model_type, &data)?;

        let existing = match &id {
            Some(id) => self.records.get(id)?,
            None => None,
        };

        let (mut record, operation) = match existing {
            Some(mut record) if !record.deleted => {
                record.data = data;
                (record, Operation::Update)
            }
            _ => {
                let record = match id {
                    Some(id) => Record::with_id(id, model_type, data),
                    None => Record::new(model_type, data),
                };
                (record, Operation::Create)
            }
        };
        record.last_changed_at = self.tick();

        self.outbox.enqueue(&record, operation)?;
        debug!(record_id = %record.id, model_type, %operation, "local write committed");
        self.publisher
            .publish(DataEvent::local(DataEventKind::LocalSaved, &record));
        Ok(record)
    }

    /// Deletes a record: commits a tombstone together with its outbox event
    /// and publishes `LocalDeleted`. Returns the tombstoned record, or
    /// `None` if there was nothing to delete.
    pub fn delete(&self, record_id: &RecordId) -> SyncResult<Option<Record>> {
        let Some(mut record) = self.records.get(record_id)? else {
            return Ok(None);
        };
        if record.deleted {
            return Ok(None);
        }
        record.deleted = true;
        record.last_changed_at = self.tick();

        self.outbox.enqueue(&record, Operation::Delete)?;
        debug!(record_id = %record.id, "local delete committed");
        self.publisher
            .publish(DataEvent::local(DataEventKind::LocalDeleted, &record));
        Ok(Some(record))
    }

    /// Fetches a live record by id. Tombstoned records read as absent.
    pub fn get(&self, record_id: &RecordId) -> SyncResult<Option<Record>> {
        Ok(self
            .records
            .get(record_id)?
            .filter(|record| !record.deleted))
    }

    /// Returns the live records of a model type matching `predicate`.
    pub fn query(
        &self,
        model_type: &str,
        predicate: impl Fn(&Record) -> bool,
    ) -> SyncResult<Vec<Record>> {
        Ok(self.records.query(model_type, predicate)?)
    }

    /// Subscribes to mutation outcomes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DataEvent> {
        self.publisher.subscribe()
    }

    /// The underlying outbox, for dead-letter inspection and sync wiring.
    pub fn outbox(&self) -> &MutationOutbox {
        &self.outbox
    }

    /// The underlying record store, for sync wiring.
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    fn tick(&self) -> HybridTimestamp {
        let mut clock = self.clock.lock().expect("clock mutex poisoned");
        *clock = clock.tick();
        *clock
    }
}
