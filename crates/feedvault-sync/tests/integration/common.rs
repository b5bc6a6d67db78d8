//! Shared test helpers for queue and scheduler tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use feedvault_cache::{DatabasePool, SqliteQueueStore};
use feedvault_core::{
    domain::{Operation, QueueEntry, RepositoryError, Session},
    ports::{IRecordDispatcher, ISessionStore},
};
use feedvault_sync::OperationQueue;

/// One call observed by the mock dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    pub operation: Operation,
    pub key: String,
    pub payload: Value,
}

/// Record dispatcher with scripted outcomes
///
/// Queued failures are returned first, one per call; after that every call
/// returns `always` (success when `None`). A gated dispatcher waits for a
/// semaphore permit before answering.
#[derive(Default)]
pub struct MockDispatcher {
    calls: Mutex<Vec<DispatchedCall>>,
    failures: Mutex<VecDeque<RepositoryError>>,
    always: Option<RepositoryError>,
    gate: Option<Arc<Semaphore>>,
    pub entered: Notify,
}

impl MockDispatcher {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn always_failing(err: RepositoryError) -> Self {
        Self {
            always: Some(err),
            ..Self::default()
        }
    }

    pub fn failing_first(failures: Vec<RepositoryError>) -> Self {
        Self {
            failures: Mutex::new(failures.into()),
            ..Self::default()
        }
    }

    /// Dispatcher that blocks each call until a permit is added to the gate
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let dispatcher = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (dispatcher, gate)
    }

    pub fn calls(&self) -> Vec<DispatchedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IRecordDispatcher for MockDispatcher {
    async fn dispatch(&self, entry: &QueueEntry) -> Result<(), RepositoryError> {
        self.calls.lock().unwrap().push(DispatchedCall {
            operation: entry.operation(),
            key: entry.key().to_string(),
            payload: entry.payload().clone(),
        });
        self.entered.notify_one();

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        match &self.always {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Session store that only records invalidations
#[derive(Default)]
pub struct RecordingSessionStore {
    pub invalidations: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ISessionStore for RecordingSessionStore {
    async fn current(&self) -> anyhow::Result<Option<Session>> {
        Ok(None)
    }

    async fn invalidate(&self, reason: &str) -> anyhow::Result<()> {
        self.invalidations.lock().unwrap().push(reason.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub queue: Arc<OperationQueue>,
    pub store: Arc<SqliteQueueStore>,
    pub dispatcher: Arc<MockDispatcher>,
    pub sessions: Arc<RecordingSessionStore>,
}

/// Opens a queue over a fresh in-memory store
pub async fn harness(dispatcher: MockDispatcher, max_retries: u32) -> Harness {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let store = Arc::new(SqliteQueueStore::new(pool.pool().clone()));
    let dispatcher = Arc::new(dispatcher);
    let sessions = Arc::new(RecordingSessionStore::default());

    let queue = OperationQueue::open(
        store.clone(),
        dispatcher.clone(),
        sessions.clone(),
        max_retries,
    )
    .await
    .expect("Failed to open queue");

    Harness {
        queue: Arc::new(queue),
        store,
        dispatcher,
        sessions,
    }
}

pub fn server_error(status: u16) -> RepositoryError {
    RepositoryError::Status {
        status,
        error: Some("InternalServerError".to_string()),
        message: None,
    }
}
