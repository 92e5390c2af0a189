use outpost_storage::{outbox_store, Database, EventStatus};
use outpost_types::{MutationEvent, Operation, RecordId};

fn make_event(record_id: &RecordId, operation: Operation) -> MutationEvent {
    MutationEvent::new("note", record_id.clone(), operation, r#"{"title":"t"}"#, 0)
}

fn insert(db: &Database, event: &MutationEvent) {
    db.transaction(|tx| outbox_store::insert_event(tx, event))
        .unwrap();
}

fn claim(db: &Database, max: usize) -> Vec<outpost_storage::StoredEvent> {
    db.transaction(|tx| outbox_store::claim_batch(tx, now(), max))
        .unwrap()
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

// ── Insert & get ─────────────────────────────────────────────────

#[test]
fn insert_and_get() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);

    let stored = db
        .with_conn(|conn| outbox_store::get_event(conn, &event.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.event, event);
    assert_eq!(stored.status, EventStatus::Pending);
    assert_eq!(stored.attempts, 0);
    assert!(stored.not_before.is_none());
}

#[test]
fn duplicate_insert_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);
    assert!(db
        .transaction(|tx| outbox_store::insert_event(tx, &event))
        .is_err());
}

// ── claim_batch ──────────────────────────────────────────────────

#[test]
fn claims_oldest_first_across_records() {
    let db = Database::open_in_memory().unwrap();
    let r1 = RecordId::new();
    let r2 = RecordId::new();
    let e1 = make_event(&r1, Operation::Create);
    let e2 = make_event(&r2, Operation::Create);
    insert(&db, &e1);
    insert(&db, &e2);

    let batch = claim(&db, 10);
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].event.id, e1.id);
    assert_eq!(batch[1].event.id, e2.id);
    assert!(batch.iter().all(|e| e.status == EventStatus::InFlight));
}

#[test]
fn one_claim_per_record() {
    let db = Database::open_in_memory().unwrap();
    let r1 = RecordId::new();
    let e1 = make_event(&r1, Operation::Create);
    let e2 = make_event(&r1, Operation::Update);
    insert(&db, &e1);
    insert(&db, &e2);

    let batch = claim(&db, 10);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].event.id, e1.id);

    // The second event stays blocked while the first is in flight.
    assert!(claim(&db, 10).is_empty());

    db.transaction(|tx| {
        outbox_store::delete_event(tx, &e1.id, &[EventStatus::InFlight])
    })
    .unwrap();
    let batch = claim(&db, 10);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].event.id, e2.id);
}

#[test]
fn held_entry_blocks_later_events_for_record() {
    let db = Database::open_in_memory().unwrap();
    let r1 = RecordId::new();
    let e1 = make_event(&r1, Operation::Create);
    let e2 = make_event(&r1, Operation::Update);
    insert(&db, &e1);
    insert(&db, &e2);

    claim(&db, 10);
    db.transaction(|tx| outbox_store::hold_event(tx, &e1.id))
        .unwrap();

    assert!(claim(&db, 10).is_empty());
}

#[test]
fn backoff_deadline_respected() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);

    claim(&db, 10);
    db.transaction(|tx| outbox_store::requeue_event(tx, &event.id, now() + 60_000))
        .unwrap();

    assert!(claim(&db, 10).is_empty());

    // A deadline in the past makes the entry eligible again.
    db.transaction(|tx| {
        let claimed = outbox_store::claim_batch(tx, now() + 120_000, 10)?;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn max_count_limits_batch() {
    let db = Database::open_in_memory().unwrap();
    for _ in 0..5 {
        insert(&db, &make_event(&RecordId::new(), Operation::Create));
    }
    assert_eq!(claim(&db, 3).len(), 3);
    assert_eq!(claim(&db, 3).len(), 2);
}

// ── Lifecycle transitions ────────────────────────────────────────

#[test]
fn requeue_counts_attempts() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);

    for expected in 1..=3 {
        claim(&db, 10);
        db.transaction(|tx| outbox_store::requeue_event(tx, &event.id, 0))
            .unwrap();
        let stored = db
            .with_conn(|conn| outbox_store::get_event(conn, &event.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts, expected);
        assert_eq!(stored.status, EventStatus::Pending);
    }
}

#[test]
fn unclaim_does_not_count_attempt() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);

    claim(&db, 10);
    db.transaction(|tx| outbox_store::unclaim_event(tx, &event.id))
        .unwrap();
    let stored = db
        .with_conn(|conn| outbox_store::get_event(conn, &event.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EventStatus::Pending);
    assert_eq!(stored.attempts, 0);
}

#[test]
fn dead_letter_keeps_row_with_reason() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);

    db.transaction(|tx| outbox_store::dead_letter_event(tx, &event.id, "rejected: denied"))
        .unwrap();

    let dead = db.with_conn(outbox_store::dead_letters).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].reason.as_deref(), Some("rejected: denied"));
    assert!(claim(&db, 10).is_empty());

    let cleared = db
        .transaction(|tx| outbox_store::clear_dead_letters(tx))
        .unwrap();
    assert_eq!(cleared, 1);
    assert!(db.with_conn(outbox_store::dead_letters).unwrap().is_empty());
}

#[test]
fn release_rebases_and_replaces_payload() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Update);
    insert(&db, &event);

    db.transaction(|tx| outbox_store::hold_event(tx, &event.id))
        .unwrap();
    db.transaction(|tx| {
        outbox_store::release_event(tx, &event.id, Some(9), Some(r#"{"title":"merged"}"#))
    })
    .unwrap();

    let stored = db
        .with_conn(|conn| outbox_store::get_event(conn, &event.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EventStatus::Pending);
    assert_eq!(stored.event.version, 9);
    assert_eq!(stored.event.payload, r#"{"title":"merged"}"#);
}

#[test]
fn collapse_removes_pending_and_held_only() {
    let db = Database::open_in_memory().unwrap();
    let r1 = RecordId::new();
    let in_flight = make_event(&r1, Operation::Create);
    let held = make_event(&r1, Operation::Update);
    let pending = make_event(&r1, Operation::Update);
    insert(&db, &in_flight);
    insert(&db, &held);
    insert(&db, &pending);

    claim(&db, 10); // claims `in_flight`
    db.transaction(|tx| outbox_store::hold_event(tx, &held.id))
        .unwrap();

    let collapsed = db
        .transaction(|tx| outbox_store::collapse_unretired(tx, &r1))
        .unwrap();
    assert_eq!(collapsed, 2);

    assert!(db
        .with_conn(|conn| outbox_store::get_event(conn, &pending.id))
        .unwrap()
        .is_none());
    assert!(db
        .with_conn(|conn| outbox_store::get_event(conn, &held.id))
        .unwrap()
        .is_none());
    assert!(db
        .with_conn(|conn| outbox_store::get_event(conn, &in_flight.id))
        .unwrap()
        .is_some());
}

#[test]
fn reset_in_flight_recovers_crashed_entries() {
    let db = Database::open_in_memory().unwrap();
    let event = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &event);
    claim(&db, 10);

    let reset = db
        .transaction(|tx| outbox_store::reset_in_flight(tx))
        .unwrap();
    assert_eq!(reset, 1);
    assert_eq!(claim(&db, 10).len(), 1);
}

// ── Queries ──────────────────────────────────────────────────────

#[test]
fn oldest_unretired_skips_dead() {
    let db = Database::open_in_memory().unwrap();
    let r1 = RecordId::new();
    let dead = make_event(&r1, Operation::Create);
    let live = make_event(&r1, Operation::Update);
    insert(&db, &dead);
    insert(&db, &live);

    db.transaction(|tx| outbox_store::dead_letter_event(tx, &dead.id, "boom"))
        .unwrap();

    let oldest = db
        .with_conn(|conn| outbox_store::oldest_unretired(conn, &r1))
        .unwrap()
        .unwrap();
    assert_eq!(oldest.event.id, live.id);
}

#[test]
fn unretired_count_excludes_dead() {
    let db = Database::open_in_memory().unwrap();
    let a = make_event(&RecordId::new(), Operation::Create);
    let b = make_event(&RecordId::new(), Operation::Create);
    insert(&db, &a);
    insert(&db, &b);
    db.transaction(|tx| outbox_store::dead_letter_event(tx, &a.id, "boom"))
        .unwrap();

    assert_eq!(db.with_conn(outbox_store::unretired_count).unwrap(), 1);
}
