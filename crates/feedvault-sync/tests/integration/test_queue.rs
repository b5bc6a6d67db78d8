//! Operation queue: enqueue collapse, drain outcomes and maintenance

use serde_json::json;

use feedvault_core::domain::{
    Collection, EntryStatus, Operation, QueueEntry, RecordKey, RepositoryError,
};
use feedvault_core::ports::IQueueStore;
use feedvault_sync::{DrainReport, EnqueueOutcome, OperationQueue};

use crate::common::{harness, server_error, MockDispatcher};

fn key(k: &str) -> RecordKey {
    RecordKey::new(k).unwrap()
}

// ============================================================================
// Enqueue
// ============================================================================

#[tokio::test]
async fn test_create_then_delete_leaves_nothing_to_send() {
    let h = harness(MockDispatcher::ok(), 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Share, key("share-7"), json!({"url": "https://example.com/a"}))
        .await
        .unwrap();
    let outcome = h
        .queue
        .enqueue(Operation::Delete, Collection::Share, key("share-7"), json!({}))
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Cancelled);
    assert!(h
        .store
        .find_by_key(Collection::Share, &key("share-7"))
        .await
        .unwrap()
        .is_none());

    let report = h.queue.drain().await;
    assert_eq!(report.processed, 0);
    assert!(h.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn test_last_write_wins() {
    let h = harness(MockDispatcher::ok(), 5).await;

    let first = h
        .queue
        .enqueue(Operation::Update, Collection::ReadPosition, key("article-1"), json!({"offset": 10}))
        .await
        .unwrap();
    let second = h
        .queue
        .enqueue(Operation::Update, Collection::ReadPosition, key("article-1"), json!({"offset": 80}))
        .await
        .unwrap();

    let EnqueueOutcome::Inserted(id) = first else {
        panic!("first enqueue should insert, got {first:?}");
    };
    assert_eq!(second, EnqueueOutcome::Replaced(id));

    let entries = h.queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation(), Operation::Update);
    assert_eq!(entries[0].payload(), &json!({"offset": 80}));
}

#[tokio::test]
async fn test_rapid_toggling_keeps_one_entry() {
    let h = harness(MockDispatcher::ok(), 5).await;

    for starred in [true, false, true, false, true] {
        h.queue
            .enqueue(
                Operation::Update,
                Collection::ReadPosition,
                key("article-9"),
                json!({"starred": starred}),
            )
            .await
            .unwrap();
    }

    let entries = h.queue.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload(), &json!({"starred": true}));
}

#[tokio::test]
async fn test_same_key_in_different_collections_is_independent() {
    let h = harness(MockDispatcher::ok(), 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Follow, key("did:plc:bob"), json!({}))
        .await
        .unwrap();
    h.queue
        .enqueue(Operation::Create, Collection::Share, key("did:plc:bob"), json!({}))
        .await
        .unwrap();

    assert_eq!(h.queue.counts().await.unwrap().pending, 2);
}

#[tokio::test]
async fn test_timestamps_increase_per_enqueue() {
    let h = harness(MockDispatcher::ok(), 5).await;

    for k in ["a", "b", "c"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, key(k), json!({}))
            .await
            .unwrap();
    }

    let entries = h.queue.entries().await.unwrap();
    let timestamps: Vec<i64> = entries.iter().map(|e| e.timestamp()).collect();
    assert!(timestamps.windows(2).all(|w| w[0] < w[1]), "{timestamps:?}");
}

#[tokio::test]
async fn test_enqueue_on_failed_entry_starts_fresh() {
    let h = harness(MockDispatcher::always_failing(server_error(400)), 5).await;

    h.queue
        .enqueue(Operation::Update, Collection::ReadPosition, key("article-3"), json!({"offset": 1}))
        .await
        .unwrap();
    h.queue.drain().await;
    assert_eq!(h.queue.counts().await.unwrap().failed, 1);

    h.queue
        .enqueue(Operation::Update, Collection::ReadPosition, key("article-3"), json!({"offset": 2}))
        .await
        .unwrap();

    let entry = h
        .store
        .find_by_key(Collection::ReadPosition, &key("article-3"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status(), EntryStatus::Pending);
    assert_eq!(entry.retry_count(), 0);
    assert_eq!(entry.last_error(), None);
    assert_eq!(entry.payload(), &json!({"offset": 2}));
}

#[tokio::test]
async fn test_enqueue_publishes_counts() {
    let h = harness(MockDispatcher::ok(), 5).await;
    let rx = h.queue.subscribe();
    assert_eq!(rx.borrow().total(), 0);

    h.queue
        .enqueue(Operation::Create, Collection::Subscription, key("https://example.com/feed.xml"), json!({}))
        .await
        .unwrap();
    assert_eq!(rx.borrow().pending_count(), 1);

    h.queue.drain().await;
    assert_eq!(rx.borrow().total(), 0);
}

// ============================================================================
// Drain
// ============================================================================

#[tokio::test]
async fn test_empty_drain_is_a_no_op() {
    let h = harness(MockDispatcher::ok(), 5).await;

    assert_eq!(h.queue.drain().await, DrainReport::default());
    assert_eq!(h.queue.drain().await, DrainReport::default());
    assert!(h.dispatcher.calls().is_empty());
}

#[tokio::test]
async fn test_offline_update_is_sent_once_and_removed() {
    let h = harness(MockDispatcher::ok(), 5).await;

    h.queue
        .enqueue(
            Operation::Update,
            Collection::ReadPosition,
            key("article-42"),
            json!({"starred": true}),
        )
        .await
        .unwrap();

    let report = h.queue.drain().await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.queue.counts().await.unwrap().total(), 0);

    let calls = h.dispatcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].key, "article-42");
    assert_eq!(calls[0].payload, json!({"starred": true}));
}

#[tokio::test]
async fn test_drain_sends_in_timestamp_order() {
    let h = harness(MockDispatcher::ok(), 5).await;

    for k in ["first", "second", "third"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, key(k), json!({}))
            .await
            .unwrap();
    }
    // Rewriting "first" moves it to the back.
    h.queue
        .enqueue(Operation::Update, Collection::Share, key("first"), json!({"note": "edited"}))
        .await
        .unwrap();

    h.queue.drain().await;
    let keys: Vec<String> = h.dispatcher.calls().into_iter().map(|c| c.key).collect();
    assert_eq!(keys, vec!["second", "third", "first"]);
}

#[tokio::test]
async fn test_retry_ceiling_is_exact() {
    let h = harness(MockDispatcher::always_failing(server_error(503)), 3).await;

    h.queue
        .enqueue(Operation::Update, Collection::ReadPosition, key("article-5"), json!({}))
        .await
        .unwrap();

    let first = h.queue.drain().await;
    assert_eq!((first.retried, first.failed), (1, 0));
    let second = h.queue.drain().await;
    assert_eq!((second.retried, second.failed), (1, 0));
    let third = h.queue.drain().await;
    assert_eq!((third.retried, third.failed), (0, 1));
    assert_eq!(h.dispatcher.calls().len(), 3);

    // Parked entries are not retried automatically.
    assert_eq!(h.queue.drain().await, DrainReport::default());
    assert_eq!(h.dispatcher.calls().len(), 3);

    let entry = h
        .store
        .find_by_key(Collection::ReadPosition, &key("article-5"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status(), EntryStatus::Failed);
    assert_eq!(entry.retry_count(), 3);
    assert!(entry.last_error().unwrap().contains("503"));
}

#[tokio::test]
async fn test_network_failure_is_retried_then_succeeds() {
    let dispatcher = MockDispatcher::failing_first(vec![RepositoryError::Network(
        "connection refused".to_string(),
    )]);
    let h = harness(dispatcher, 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Follow, key("did:plc:alice"), json!({}))
        .await
        .unwrap();

    let first = h.queue.drain().await;
    assert_eq!(first.retried, 1);
    assert_eq!(h.queue.counts().await.unwrap().pending, 1);

    let second = h.queue.drain().await;
    assert_eq!(second.processed, 1);
    assert_eq!(h.queue.counts().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_client_error_fails_immediately() {
    let h = harness(MockDispatcher::always_failing(server_error(400)), 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Share, key("share-1"), json!({}))
        .await
        .unwrap();
    h.queue
        .enqueue(Operation::Create, Collection::Share, key("share-2"), json!({}))
        .await
        .unwrap();

    let report = h.queue.drain().await;
    assert_eq!(report.failed, 2);
    assert_eq!(report.retried, 0);
    assert_eq!(h.dispatcher.calls().len(), 2);
    assert_eq!(h.queue.counts().await.unwrap().failed, 2);
}

#[tokio::test]
async fn test_session_expiry_stops_drain_and_invalidates() {
    let dispatcher = MockDispatcher::failing_first(vec![RepositoryError::SessionExpired {
        status: 401,
        error: Some("ExpiredToken".to_string()),
        message: Some("Token has expired".to_string()),
    }]);
    let h = harness(dispatcher, 5).await;

    for k in ["a", "b", "c"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, key(k), json!({}))
            .await
            .unwrap();
    }

    let report = h.queue.drain().await;
    assert!(report.session_invalidated);
    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(h.dispatcher.calls().len(), 1);
    assert_eq!(h.sessions.invalidations.lock().unwrap().len(), 1);

    let counts = h.queue.counts().await.unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.processing, 0);
}

#[tokio::test]
async fn test_concurrent_drains_collapse() {
    let (dispatcher, gate) = MockDispatcher::gated();
    let h = harness(dispatcher, 5).await;

    for k in ["a", "b"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, key(k), json!({}))
            .await
            .unwrap();
    }

    let queue = h.queue.clone();
    let first = tokio::spawn(async move { queue.drain().await });
    h.dispatcher.entered.notified().await;

    let second = h.queue.drain().await;
    assert!(second.skipped);
    assert_eq!(second.processed, 0);

    gate.add_permits(2);
    let first = first.await.unwrap();
    assert!(!first.skipped);
    assert_eq!(first.processed, 2);
    assert_eq!(h.dispatcher.calls().len(), 2);

    // The queue is idle again.
    assert!(!h.queue.drain().await.skipped);
}

#[tokio::test]
async fn test_enqueue_during_flight_survives_completion() {
    let (dispatcher, gate) = MockDispatcher::gated();
    let h = harness(dispatcher, 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Share, key("share-7"), json!({"url": "u"}))
        .await
        .unwrap();

    let queue = h.queue.clone();
    let drain = tokio::spawn(async move { queue.drain().await });
    h.dispatcher.entered.notified().await;

    // The create may already have reached the repository, so the delete
    // must be sent rather than cancelling it.
    let outcome = h
        .queue
        .enqueue(Operation::Delete, Collection::Share, key("share-7"), json!({}))
        .await
        .unwrap();
    assert!(matches!(outcome, EnqueueOutcome::Replaced(_)));

    gate.add_permits(1);
    assert_eq!(drain.await.unwrap().processed, 1);

    let entry = h
        .store
        .find_by_key(Collection::Share, &key("share-7"))
        .await
        .unwrap()
        .expect("newer intent survives");
    assert_eq!(entry.operation(), Operation::Delete);
    assert_eq!(entry.status(), EntryStatus::Pending);

    gate.add_permits(1);
    assert_eq!(h.queue.drain().await.processed, 1);
    let ops: Vec<Operation> = h.dispatcher.calls().into_iter().map(|c| c.operation).collect();
    assert_eq!(ops, vec![Operation::Create, Operation::Delete]);
    assert_eq!(h.queue.counts().await.unwrap().total(), 0);
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test]
async fn test_retry_failed_requeues_with_fresh_budget() {
    let h = harness(MockDispatcher::failing_first(vec![server_error(422)]), 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Share, key("share-1"), json!({}))
        .await
        .unwrap();
    assert_eq!(h.queue.drain().await.failed, 1);

    assert_eq!(h.queue.retry_failed().await.unwrap(), 1);
    let entry = h
        .store
        .find_by_key(Collection::Share, &key("share-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status(), EntryStatus::Pending);
    assert_eq!(entry.retry_count(), 0);

    assert_eq!(h.queue.drain().await.processed, 1);
}

#[tokio::test]
async fn test_clear_failed_keeps_pending() {
    let h = harness(MockDispatcher::failing_first(vec![server_error(400)]), 5).await;

    h.queue
        .enqueue(Operation::Create, Collection::Share, key("bad"), json!({}))
        .await
        .unwrap();
    h.queue.drain().await;
    h.queue
        .enqueue(Operation::Create, Collection::Share, key("good"), json!({}))
        .await
        .unwrap();

    assert_eq!(h.queue.clear_failed().await.unwrap(), 1);
    let counts = h.queue.counts().await.unwrap();
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.pending, 1);
}

#[tokio::test]
async fn test_discard_all_empties_queue() {
    let h = harness(MockDispatcher::ok(), 5).await;
    for k in ["a", "b"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, key(k), json!({}))
            .await
            .unwrap();
    }

    assert_eq!(h.queue.discard_all().await.unwrap(), 2);
    assert_eq!(h.queue.subscribe().borrow().total(), 0);
}

#[tokio::test]
async fn test_recover_and_reopen() {
    let h = harness(MockDispatcher::ok(), 5).await;

    // An entry left processing by a crashed drain.
    let mut orphan = QueueEntry::new(
        Operation::Update,
        Collection::ReadPosition,
        key("article-7"),
        json!({"offset": 3}),
        1_000,
    );
    orphan.start_processing().unwrap();
    h.store.insert(&orphan).await.unwrap();

    let reopened = OperationQueue::open(
        h.store.clone(),
        h.dispatcher.clone(),
        h.sessions.clone(),
        5,
    )
    .await
    .unwrap();
    assert_eq!(reopened.subscribe().borrow().processing, 1);

    assert_eq!(reopened.recover().await.unwrap(), 1);
    assert_eq!(reopened.drain().await.processed, 1);
    assert_eq!(h.dispatcher.calls()[0].key, "article-7");
}
