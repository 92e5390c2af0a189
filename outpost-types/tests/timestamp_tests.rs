use outpost_types::HybridTimestamp;

// ── Construction & accessors ─────────────────────────────────────

#[test]
fn new_from_components() {
    let ts = HybridTimestamp::new(1000, 5);
    assert_eq!(ts.wall_time(), 1000);
    assert_eq!(ts.logical(), 5);
}

#[test]
fn now_has_zero_logical() {
    let ts = HybridTimestamp::now();
    assert_eq!(ts.logical(), 0);
    assert!(ts.wall_time() > 0);
}

// ── Ordering ─────────────────────────────────────────────────────

#[test]
fn ordered_by_wall_time_first() {
    let a = HybridTimestamp::new(100, 50);
    let b = HybridTimestamp::new(200, 0);
    assert!(a < b);
    assert!(a.is_before(&b));
}

#[test]
fn logical_breaks_wall_time_ties() {
    let a = HybridTimestamp::new(100, 1);
    let b = HybridTimestamp::new(100, 2);
    assert!(a < b);
}

#[test]
fn equal_components_are_equal() {
    assert_eq!(HybridTimestamp::new(7, 7), HybridTimestamp::new(7, 7));
}

// ── tick ─────────────────────────────────────────────────────────

#[test]
fn tick_is_strictly_monotonic() {
    let mut ts = HybridTimestamp::now();
    for _ in 0..100 {
        let next = ts.tick();
        assert!(next > ts);
        ts = next;
    }
}

#[test]
fn tick_increments_logical_when_wall_stalls() {
    // A timestamp far in the future forces the logical-counter branch.
    let future = HybridTimestamp::new(u64::MAX - 1, 3);
    let next = future.tick();
    assert_eq!(next.wall_time(), u64::MAX - 1);
    assert_eq!(next.logical(), 4);
}

// ── receive ──────────────────────────────────────────────────────

#[test]
fn receive_advances_past_remote() {
    let local = HybridTimestamp::new(100, 0);
    let remote = HybridTimestamp::new(u64::MAX - 1, 9);
    let merged = local.receive(&remote);
    assert!(merged > local);
    assert!(merged > remote);
}

#[test]
fn receive_advances_past_local() {
    let local = HybridTimestamp::new(u64::MAX - 1, 9);
    let remote = HybridTimestamp::new(100, 0);
    let merged = local.receive(&remote);
    assert!(merged > local);
    assert!(merged > remote);
}

#[test]
fn receive_breaks_exact_ties() {
    let wall = u64::MAX - 1;
    let local = HybridTimestamp::new(wall, 4);
    let remote = HybridTimestamp::new(wall, 7);
    let merged = local.receive(&remote);
    assert_eq!(merged.wall_time(), wall);
    assert_eq!(merged.logical(), 8);
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serde_round_trip() {
    let ts = HybridTimestamp::new(12345, 42);
    let json = serde_json::to_string(&ts).unwrap();
    let back: HybridTimestamp = serde_json::from_str(&json).unwrap();
    assert_eq!(ts, back);
}
