use outpost_model::{ModelField, ModelSchema, SchemaRegistry};
use outpost_storage::Database;
use outpost_sync::{DataEventKind, DataStore, EventPublisher, SyncError};
use outpost_types::RecordId;
use serde_json::json;

fn make_store() -> DataStore {
    let registry = SchemaRegistry::new();
    registry.register(ModelSchema::new(
        "note",
        vec![
            ModelField::string("title", true),
            ModelField::bool("pinned", false),
        ],
    ));
    DataStore::open(
        Database::open_in_memory().unwrap(),
        registry,
        EventPublisher::default(),
    )
    .unwrap()
}

// ── Save ─────────────────────────────────────────────────────────

#[tokio::test]
async fn save_creates_and_publishes() {
    let store = make_store();
    let mut rx = store.subscribe();

    let record = store.save("note", None, json!({"title": "hello"})).unwrap();
    assert_eq!(record.version, 0);
    assert!(!record.deleted);

    let loaded = store.get(&record.id).unwrap().unwrap();
    assert_eq!(loaded, record);
    assert_eq!(store.outbox().unretired_count().unwrap(), 1);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, DataEventKind::LocalSaved);
    assert_eq!(event.record_id, record.id);
}

#[tokio::test]
async fn save_with_id_updates_in_place() {
    let store = make_store();
    let record = store.save("note", None, json!({"title": "v1"})).unwrap();

    let updated = store
        .save("note", Some(record.id.clone()), json!({"title": "v2"}))
        .unwrap();
    assert_eq!(updated.id, record.id);
    assert_eq!(
        store.get(&record.id).unwrap().unwrap().get_str("/title"),
        Some("v2")
    );

    // Create + update coalesce into a single pending send.
    assert_eq!(store.outbox().unretired_count().unwrap(), 1);
}

#[tokio::test]
async fn save_advances_local_timestamp() {
    let store = make_store();
    let first = store.save("note", None, json!({"title": "a"})).unwrap();
    let second = store.save("note", None, json!({"title": "b"})).unwrap();
    assert!(first.last_changed_at < second.last_changed_at);
}

#[tokio::test]
async fn save_rejects_schema_violations_synchronously() {
    let store = make_store();
    let err = store
        .save("note", None, json!({"pinned": true}))
        .unwrap_err();
    assert!(matches!(err, SyncError::Model(_)));

    // Nothing was committed.
    assert_eq!(store.outbox().unretired_count().unwrap(), 0);
    assert!(store.query("note", |_| true).unwrap().is_empty());
}

#[tokio::test]
async fn save_rejects_unknown_model() {
    let store = make_store();
    assert!(store.save("ghost", None, json!({})).is_err());
}

// ── Delete ───────────────────────────────────────────────────────

#[tokio::test]
async fn delete_tombstones_and_publishes() {
    let store = make_store();
    let record = store.save("note", None, json!({"title": "x"})).unwrap();
    let mut rx = store.subscribe();

    let deleted = store.delete(&record.id).unwrap().unwrap();
    assert!(deleted.deleted);

    // Tombstoned records read as absent but the delete is queued.
    assert!(store.get(&record.id).unwrap().is_none());
    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, DataEventKind::LocalDeleted);

    // The pending create collapsed into the delete.
    assert_eq!(store.outbox().unretired_count().unwrap(), 1);
}

#[tokio::test]
async fn delete_missing_record_is_none() {
    let store = make_store();
    assert!(store.delete(&RecordId::new()).unwrap().is_none());
    assert!(store.delete(&RecordId::from_string("gone")).unwrap().is_none());
}

#[tokio::test]
async fn double_delete_is_none() {
    let store = make_store();
    let record = store.save("note", None, json!({"title": "x"})).unwrap();
    assert!(store.delete(&record.id).unwrap().is_some());
    assert!(store.delete(&record.id).unwrap().is_none());
}

// ── Query ────────────────────────────────────────────────────────

#[tokio::test]
async fn query_sees_live_records_only() {
    let store = make_store();
    let keep = store.save("note", None, json!({"title": "keep"})).unwrap();
    let drop = store.save("note", None, json!({"title": "drop"})).unwrap();
    store.delete(&drop.id).unwrap();

    let results = store.query("note", |_| true).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, keep.id);
}
