//! Drain scheduler: connectivity transitions, manual triggers and shutdown

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use feedvault_core::domain::{Collection, Operation, QueueCounts, RecordKey, RepositoryError};
use feedvault_sync::{
    Connectivity, ConnectivityMonitor, DrainScheduler, OperationQueue, SyncHandle,
};

use crate::common::{harness, Harness, MockDispatcher};

const LONG_INTERVAL: Duration = Duration::from_secs(3600);
const WAIT: Duration = Duration::from_secs(5);

fn start(
    queue: Arc<OperationQueue>,
    monitor: &ConnectivityMonitor,
    cancel: &CancellationToken,
) -> (SyncHandle, JoinHandle<()>) {
    let (scheduler, handle) = DrainScheduler::new(queue, monitor, LONG_INTERVAL);
    let task = tokio::spawn(scheduler.run(cancel.clone()));
    (handle, task)
}

async fn enqueue_article_42(h: &Harness) {
    h.queue
        .enqueue(
            Operation::Update,
            Collection::ReadPosition,
            RecordKey::new("article-42").unwrap(),
            json!({"starred": true}),
        )
        .await
        .unwrap();
}

async fn wait_until_empty(h: &Harness) {
    let mut rx = h.queue.subscribe();
    tokio::time::timeout(WAIT, rx.wait_for(|c: &QueueCounts| c.total() == 0))
        .await
        .expect("queue should drain")
        .unwrap();
}

#[tokio::test]
async fn test_reconnect_drains_offline_writes() {
    let h = harness(MockDispatcher::ok(), 5).await;
    let monitor = ConnectivityMonitor::new(Connectivity::Offline);
    let cancel = CancellationToken::new();

    enqueue_article_42(&h).await;
    let (_handle, task) = start(h.queue.clone(), &monitor, &cancel);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.dispatcher.calls().is_empty(), "no drain while offline");

    monitor.set_online();
    wait_until_empty(&h).await;

    let calls = h.dispatcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].key, "article-42");
    assert_eq!(calls[0].payload, json!({"starred": true}));

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_manual_trigger_drains_when_online() {
    let h = harness(MockDispatcher::ok(), 5).await;
    let monitor = ConnectivityMonitor::new(Connectivity::Online);
    let cancel = CancellationToken::new();
    let (handle, task) = start(h.queue.clone(), &monitor, &cancel);

    // Let the immediate startup tick pass on an empty queue.
    tokio::time::sleep(Duration::from_millis(50)).await;

    enqueue_article_42(&h).await;
    assert!(handle.trigger_sync());
    wait_until_empty(&h).await;
    assert_eq!(h.dispatcher.calls().len(), 1);

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_manual_trigger_is_deferred_while_offline() {
    let h = harness(MockDispatcher::ok(), 5).await;
    let monitor = ConnectivityMonitor::new(Connectivity::Offline);
    let cancel = CancellationToken::new();
    let (handle, task) = start(h.queue.clone(), &monitor, &cancel);

    enqueue_article_42(&h).await;
    assert!(handle.trigger_sync());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.dispatcher.calls().is_empty());
    assert_eq!(h.queue.counts().await.unwrap().pending, 1);

    monitor.set_online();
    wait_until_empty(&h).await;

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_session_rejection_pauses_automatic_drains() {
    let dispatcher = MockDispatcher::failing_first(vec![RepositoryError::NoSession]);
    let h = harness(dispatcher, 5).await;
    let monitor = ConnectivityMonitor::new(Connectivity::Offline);
    let cancel = CancellationToken::new();

    for k in ["a", "b"] {
        h.queue
            .enqueue(Operation::Create, Collection::Share, RecordKey::new(k).unwrap(), json!({}))
            .await
            .unwrap();
    }
    let (handle, task) = start(h.queue.clone(), &monitor, &cancel);

    monitor.set_online();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.dispatcher.calls().len(), 1);

    // Flapping connectivity does not resume draining.
    monitor.set_offline();
    monitor.set_online();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.dispatcher.calls().len(), 1);

    // A manual sync after re-authorization does.
    assert!(handle.trigger_sync());
    tokio::time::timeout(WAIT, async {
        while h.queue.counts().await.unwrap().pending > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pending entries should drain");
    assert_eq!(h.dispatcher.calls().len(), 2);

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_scheduler_stops_when_handles_drop() {
    let h = harness(MockDispatcher::ok(), 5).await;
    let monitor = ConnectivityMonitor::new(Connectivity::Online);
    let cancel = CancellationToken::new();
    let (handle, task) = start(h.queue.clone(), &monitor, &cancel);

    drop(handle);
    tokio::time::timeout(WAIT, task)
        .await
        .expect("scheduler should exit once every handle is dropped")
        .unwrap();
}
