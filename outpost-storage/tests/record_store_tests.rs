use outpost_storage::{Database, RecordStore};
use outpost_types::{Record, RecordId};
use serde_json::json;

fn make_store() -> RecordStore {
    RecordStore::new(Database::open_in_memory().unwrap())
}

fn make_record(version: u64) -> Record {
    let mut record = Record::new("note", json!({"title": "test"}));
    record.version = version;
    record
}

// ── Save & get ───────────────────────────────────────────────────

#[test]
fn save_and_get_round_trip() {
    let store = make_store();
    let record = make_record(2);
    store.save(&record).unwrap();

    let loaded = store.get(&record.id).unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[test]
fn get_missing_record() {
    let store = make_store();
    assert!(store.get(&RecordId::new()).unwrap().is_none());
}

#[test]
fn save_overwrites() {
    let store = make_store();
    let mut record = make_record(1);
    store.save(&record).unwrap();

    record.data = json!({"title": "edited"});
    store.save(&record).unwrap();

    let loaded = store.get(&record.id).unwrap().unwrap();
    assert_eq!(loaded.get_str("/title"), Some("edited"));
}

#[test]
fn tombstones_persist() {
    let store = make_store();
    let mut record = make_record(1);
    record.deleted = true;
    store.save(&record).unwrap();

    let loaded = store.get(&record.id).unwrap().unwrap();
    assert!(loaded.deleted);
}

// ── Query ────────────────────────────────────────────────────────

#[test]
fn query_filters_by_model_and_predicate() {
    let store = make_store();
    let mut a = Record::new("note", json!({"title": "keep"}));
    let b = Record::new("note", json!({"title": "drop"}));
    let c = Record::new("task", json!({"title": "keep"}));
    store.save(&a).unwrap();
    store.save(&b).unwrap();
    store.save(&c).unwrap();

    let kept = store
        .query("note", |r| r.get_str("/title") == Some("keep"))
        .unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, a.id);

    // Tombstoned records never appear.
    a.deleted = true;
    store.save(&a).unwrap();
    let kept = store.query("note", |_| true).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, b.id);
}

// ── Delete ───────────────────────────────────────────────────────

#[test]
fn delete_tombstones_in_place() {
    let store = make_store();
    let record = make_record(1);
    store.save(&record).unwrap();

    assert!(store.delete(&record.id).unwrap());
    assert!(store.get(&record.id).unwrap().unwrap().deleted);

    // Already-deleted and missing records report false.
    assert!(!store.delete(&record.id).unwrap());
    assert!(!store.delete(&RecordId::new()).unwrap());
}

// ── apply_remote ─────────────────────────────────────────────────

#[test]
fn apply_remote_to_fresh_store() {
    let store = make_store();
    let remote = make_record(3);
    assert!(store.apply_remote(&remote).unwrap());
    assert_eq!(store.get(&remote.id).unwrap().unwrap().version, 3);
}

#[test]
fn apply_remote_is_idempotent() {
    let store = make_store();
    let remote = make_record(3);
    assert!(store.apply_remote(&remote).unwrap());
    assert!(!store.apply_remote(&remote).unwrap());
    assert_eq!(store.get(&remote.id).unwrap().unwrap(), remote);
}

#[test]
fn apply_remote_never_regresses_version() {
    let store = make_store();
    let mut newer = make_record(5);
    newer.data = json!({"title": "newer"});
    store.apply_remote(&newer).unwrap();

    let mut stale = newer.clone();
    stale.version = 4;
    stale.data = json!({"title": "stale"});
    assert!(!store.apply_remote(&stale).unwrap());

    let loaded = store.get(&newer.id).unwrap().unwrap();
    assert_eq!(loaded.version, 5);
    assert_eq!(loaded.get_str("/title"), Some("newer"));
}

#[test]
fn apply_remote_delete_stores_tombstone() {
    let store = make_store();
    let record = make_record(1);
    store.save(&record).unwrap();

    let mut tombstone = record.clone();
    tombstone.version = 2;
    tombstone.deleted = true;
    assert!(store.apply_remote(&tombstone).unwrap());
    assert!(store.get(&record.id).unwrap().unwrap().deleted);
}

// ── apply_ack ────────────────────────────────────────────────────

#[test]
fn apply_ack_raises_version() {
    let store = make_store();
    let record = make_record(0);
    store.save(&record).unwrap();

    assert!(store.apply_ack(&record.id, 1).unwrap());
    assert_eq!(store.get(&record.id).unwrap().unwrap().version, 1);
}

#[test]
fn apply_ack_is_version_gated() {
    let store = make_store();
    let record = make_record(4);
    store.save(&record).unwrap();

    assert!(!store.apply_ack(&record.id, 3).unwrap());
    assert!(!store.apply_ack(&record.id, 4).unwrap());
    assert_eq!(store.get(&record.id).unwrap().unwrap().version, 4);
}

// ── Durability ───────────────────────────────────────────────────

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outpost.db");
    let record = make_record(7);

    {
        let store = RecordStore::new(Database::open(&path).unwrap());
        store.save(&record).unwrap();
    }

    let store = RecordStore::new(Database::open(&path).unwrap());
    let loaded = store.get(&record.id).unwrap().unwrap();
    assert_eq!(loaded.version, 7);
    assert_eq!(
        loaded.last_changed_at.wall_time(),
        record.last_changed_at.wall_time()
    );
}
