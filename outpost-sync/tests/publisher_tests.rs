use outpost_sync::{DataEvent, DataEventKind, EventPublisher};
use outpost_types::{Record, RecordId};
use serde_json::json;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

fn saved_event(title: &str) -> DataEvent {
    let record = Record::with_id(
        RecordId::from_string(title),
        "note",
        json!({"title": title}),
    );
    DataEvent {
        kind: DataEventKind::LocalSaved,
        model_type: record.model_type.clone(),
        record_id: record.id.clone(),
        data: Some(record.data.clone()),
        version: record.version,
        event_id: None,
        reason: None,
    }
}

#[tokio::test]
async fn subscribers_receive_in_publish_order() {
    let publisher = EventPublisher::new(16);
    let mut rx = publisher.subscribe();

    publisher.publish(saved_event("a"));
    publisher.publish(saved_event("b"));
    publisher.publish(saved_event("c"));

    for expected in ["a", "b", "c"] {
        let event = rx.recv().await.unwrap();
        assert_eq!(event.record_id.as_str(), expected);
    }
}

#[tokio::test]
async fn publish_without_subscribers_is_harmless() {
    let publisher = EventPublisher::new(4);
    publisher.publish(saved_event("nobody-home"));
    assert_eq!(publisher.subscriber_count(), 0);
}

#[tokio::test]
async fn each_subscriber_gets_every_event() {
    let publisher = EventPublisher::new(16);
    let mut rx1 = publisher.subscribe();
    let mut rx2 = publisher.subscribe();

    publisher.publish(saved_event("a"));

    assert_eq!(rx1.recv().await.unwrap().record_id.as_str(), "a");
    assert_eq!(rx2.recv().await.unwrap().record_id.as_str(), "a");
}

#[tokio::test]
async fn slow_subscriber_lags_without_blocking_publisher() {
    let publisher = EventPublisher::new(4);
    let mut slow = publisher.subscribe();

    // Publishing far past capacity must never block or fail.
    for i in 0..20 {
        publisher.publish(saved_event(&format!("event-{i}")));
    }

    // The slow subscriber observes a bounded lag, then the newest events.
    match slow.recv().await {
        Err(RecvError::Lagged(missed)) => assert_eq!(missed, 16),
        other => panic!("expected lag, got {other:?}"),
    }
    let event = slow.recv().await.unwrap();
    assert_eq!(event.record_id.as_str(), "event-16");
}

#[tokio::test]
async fn dropped_subscriber_unsubscribes() {
    let publisher = EventPublisher::new(4);
    let rx = publisher.subscribe();
    assert_eq!(publisher.subscriber_count(), 1);
    drop(rx);
    assert_eq!(publisher.subscriber_count(), 0);
}

#[tokio::test]
async fn fresh_subscriber_sees_only_later_events() {
    let publisher = EventPublisher::new(16);
    publisher.publish(saved_event("before"));

    let mut rx = publisher.subscribe();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    publisher.publish(saved_event("after"));
    assert_eq!(rx.recv().await.unwrap().record_id.as_str(), "after");
}
