//! Operation queue
//!
//! The queue is the only writer of [`QueueEntry`] rows. It owns:
//!
//! - **enqueue**: folds a new mutation into the existing entry for the same
//!   `(collection, key)` through the conflict resolver, so a key never holds
//!   more than one entry
//! - **drain**: a single-flight, sequential sweep over pending entries in
//!   timestamp order, dispatching each one and recording the outcome
//! - **escape hatches**: bulk requeue or discard of failed entries
//!
//! ## Concurrency
//!
//! Enqueues are serialized by the timestamp lock, which a drain also takes
//! while claiming an entry. An entry is claimed (marked `processing`) right
//! before its request is sent, so operations still waiting in the pass can be
//! cancelled or merged by a concurrent enqueue. Once an entry is in flight a
//! new enqueue overwrites it verbatim; the drain's bookkeeping is conditional
//! on the entry's timestamp, so that newer intent is never lost.
//!
//! ## Counts
//!
//! Pending and failed counts are recomputed from the store after every
//! mutation and published on a `watch` channel (see [`OperationQueue::subscribe`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use feedvault_conflict::{classify, resolve, FailureClass, Resolution};
use feedvault_core::{
    domain::{
        Collection, EntryId, EntryStatus, Operation, QueueCounts, QueueEntry, RecordKey,
        RepositoryError,
    },
    ports::{IQueueStore, IRecordDispatcher, ISessionStore},
};

use crate::SyncError;

// ============================================================================
// Drain state
// ============================================================================

/// Whether a drain pass is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainState {
    #[default]
    Idle,
    Draining,
}

/// Returns the queue to `Idle` when the pass ends, including on panic
struct DrainGuard<'a> {
    state: &'a Mutex<DrainState>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = DrainState::Idle;
    }
}

fn lock_state(state: &Mutex<DrainState>) -> MutexGuard<'_, DrainState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Results
// ============================================================================

/// Summary of one drain call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries confirmed by the repository and removed
    pub processed: u64,
    /// Entries that became terminally failed during this pass
    pub failed: u64,
    /// Entries returned to pending after a retryable failure
    pub retried: u64,
    /// True when the call collapsed into a drain already in flight
    pub skipped: bool,
    /// True when the repository rejected the session and the pass stopped
    pub session_invalidated: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// What an enqueue did to the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entry_id", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new entry was created
    Inserted(EntryId),
    /// The existing entry for the key was overwritten
    Replaced(EntryId),
    /// The new operation cancelled the queued one; no entry remains
    Cancelled,
}

/// Next strictly increasing enqueue timestamp
fn next_timestamp(last: i64, now_ms: i64) -> i64 {
    now_ms.max(last.saturating_add(1))
}

// ============================================================================
// OperationQueue
// ============================================================================

/// Durable, deduplicated queue of not-yet-confirmed mutations
pub struct OperationQueue {
    store: Arc<dyn IQueueStore>,
    dispatcher: Arc<dyn IRecordDispatcher>,
    sessions: Arc<dyn ISessionStore>,
    /// Attempts allowed for retryable failures before an entry is parked
    max_retries: u32,
    /// Last timestamp handed out; also serializes enqueues
    last_timestamp: tokio::sync::Mutex<i64>,
    drain_state: Mutex<DrainState>,
    counts_tx: watch::Sender<QueueCounts>,
}

impl OperationQueue {
    /// Opens the queue over a store
    ///
    /// Seeds the timestamp clock from the newest stored entry so ordering
    /// survives restarts, and publishes the initial counts.
    ///
    /// # Arguments
    /// * `store` - Durable entry storage
    /// * `dispatcher` - Performs one entry against the repository
    /// * `sessions` - Notified when the repository rejects the session
    /// * `max_retries` - Retry ceiling for retryable failures (at least 1)
    pub async fn open(
        store: Arc<dyn IQueueStore>,
        dispatcher: Arc<dyn IRecordDispatcher>,
        sessions: Arc<dyn ISessionStore>,
        max_retries: u32,
    ) -> Result<Self, SyncError> {
        let last = store.max_timestamp().await?.unwrap_or(0);
        let counts = store.count_by_status().await?;
        let (counts_tx, _) = watch::channel(counts);

        debug!(
            last_timestamp = last,
            pending = counts.pending_count(),
            failed = counts.failed,
            max_retries,
            "Opened operation queue"
        );

        Ok(Self {
            store,
            dispatcher,
            sessions,
            max_retries: max_retries.max(1),
            last_timestamp: tokio::sync::Mutex::new(last),
            drain_state: Mutex::new(DrainState::Idle),
            counts_tx,
        })
    }

    /// Returns the retry ceiling
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns whether a drain pass is running
    pub fn drain_state(&self) -> DrainState {
        *lock_state(&self.drain_state)
    }

    // ========================================================================
    // Enqueue
    // ========================================================================

    /// Records a user mutation
    ///
    /// With no entry for `(collection, key)` a new pending entry is inserted.
    /// An existing pending or failed entry is folded through the conflict
    /// resolver; a `processing` entry is overwritten verbatim because its
    /// request may already have reached the repository.
    pub async fn enqueue(
        &self,
        operation: Operation,
        collection: Collection,
        key: RecordKey,
        payload: Value,
    ) -> Result<EnqueueOutcome, SyncError> {
        let mut last = self.last_timestamp.lock().await;
        let timestamp = next_timestamp(*last, Utc::now().timestamp_millis());

        let outcome = match self.store.find_by_key(collection, &key).await? {
            None => {
                let entry = QueueEntry::new(operation, collection, key, payload, timestamp);
                self.store.insert(&entry).await?;
                EnqueueOutcome::Inserted(*entry.id())
            }
            Some(mut existing) if existing.status() == EntryStatus::Processing => {
                debug!(
                    entry_id = %existing.id(),
                    operation = %operation,
                    "Overwriting in-flight entry"
                );
                existing.apply(operation, payload, timestamp);
                self.store.update(&existing).await?;
                EnqueueOutcome::Replaced(*existing.id())
            }
            Some(mut existing) => {
                match resolve(existing.operation(), operation, payload) {
                    Resolution::Cancel => {
                        self.store.delete(existing.id()).await?;
                        EnqueueOutcome::Cancelled
                    }
                    Resolution::Replace { operation, payload } => {
                        existing.apply(operation, payload, timestamp);
                        self.store.update(&existing).await?;
                        EnqueueOutcome::Replaced(*existing.id())
                    }
                }
            }
        };

        *last = timestamp;
        drop(last);

        info!(
            collection = %collection,
            operation = %operation,
            timestamp,
            outcome = ?outcome,
            "Enqueued operation"
        );
        self.publish_counts().await;
        Ok(outcome)
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Replays pending entries against the repository
    ///
    /// Returns immediately with `skipped = true` if another drain is running.
    /// Failures never escape: each entry's outcome is recorded in its state
    /// and summarized in the report.
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> DrainReport {
        let Some(_guard) = self.begin_drain() else {
            debug!("Drain already in progress, collapsing request");
            return DrainReport::skipped();
        };

        let mut report = DrainReport::default();
        if let Err(e) = self.drain_pending(&mut report).await {
            error!(error = %e, "Drain pass aborted");
            self.release_claimed().await;
        }
        self.publish_counts().await;

        info!(
            processed = report.processed,
            failed = report.failed,
            retried = report.retried,
            session_invalidated = report.session_invalidated,
            "Drain finished"
        );
        report
    }

    fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        let mut state = lock_state(&self.drain_state);
        match *state {
            DrainState::Draining => None,
            DrainState::Idle => {
                *state = DrainState::Draining;
                Some(DrainGuard {
                    state: &self.drain_state,
                })
            }
        }
    }

    async fn drain_pending(&self, report: &mut DrainReport) -> Result<(), SyncError> {
        let pending = self.store.list_by_status(EntryStatus::Pending).await?;
        if pending.is_empty() {
            debug!("No pending entries");
            return Ok(());
        }
        debug!(count = pending.len(), "Draining pending entries");

        for snapshot in pending {
            let Some(entry) = self.claim(&snapshot).await? else {
                continue;
            };

            match self.dispatcher.dispatch(&entry).await {
                Ok(()) => {
                    report.processed += 1;
                    if !self
                        .store
                        .delete_if_unchanged(entry.id(), entry.timestamp())
                        .await?
                    {
                        debug!(entry_id = %entry.id(), "Entry superseded while in flight, keeping newer intent");
                    }
                }
                Err(err) => {
                    let stop = self.record_failure(entry, err, report).await?;
                    if stop {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Marks the current version of an entry as processing
    ///
    /// Re-reads the entry under the enqueue lock; returns `None` if it was
    /// cancelled or is no longer pending.
    async fn claim(&self, snapshot: &QueueEntry) -> Result<Option<QueueEntry>, SyncError> {
        let _enqueue = self.last_timestamp.lock().await;
        let current = self
            .store
            .find_by_key(snapshot.collection(), snapshot.key())
            .await?;

        match current {
            Some(mut entry) if entry.status() == EntryStatus::Pending => {
                entry.start_processing()?;
                self.store.update(&entry).await?;
                Ok(Some(entry))
            }
            _ => {
                debug!(entry_id = %snapshot.id(), "Entry changed before dispatch, skipping");
                Ok(None)
            }
        }
    }

    /// Applies the classified failure to the entry
    ///
    /// # Returns
    /// `true` when the pass must stop
    async fn record_failure(
        &self,
        mut entry: QueueEntry,
        err: RepositoryError,
        report: &mut DrainReport,
    ) -> Result<bool, SyncError> {
        let message = err.to_string();

        match classify(&err) {
            FailureClass::Retryable => {
                let status = entry.record_retryable_failure(&message, self.max_retries)?;
                self.persist(&entry).await?;
                if status == EntryStatus::Failed {
                    report.failed += 1;
                    warn!(
                        entry_id = %entry.id(),
                        attempts = entry.retry_count(),
                        error = %message,
                        "Retry ceiling reached, entry failed"
                    );
                } else {
                    report.retried += 1;
                    debug!(
                        entry_id = %entry.id(),
                        attempts = entry.retry_count(),
                        error = %message,
                        "Retryable failure, entry requeued"
                    );
                }
                Ok(false)
            }
            FailureClass::Permanent => {
                entry.record_permanent_failure(&message)?;
                self.persist(&entry).await?;
                report.failed += 1;
                warn!(entry_id = %entry.id(), error = %message, "Repository rejected entry");
                Ok(false)
            }
            FailureClass::SessionInvalid => {
                entry.record_permanent_failure(&message)?;
                self.persist(&entry).await?;
                report.failed += 1;
                report.session_invalidated = true;

                warn!(entry_id = %entry.id(), error = %message, "Session rejected, stopping drain");
                if let Err(e) = self.sessions.invalidate(&message).await {
                    error!(error = %format!("{e:#}"), "Failed to invalidate session");
                }
                self.release_claimed().await;
                Ok(true)
            }
        }
    }

    async fn persist(&self, entry: &QueueEntry) -> Result<(), SyncError> {
        if !self
            .store
            .update_if_unchanged(entry, entry.timestamp())
            .await?
        {
            debug!(entry_id = %entry.id(), "Entry superseded while in flight, keeping newer intent");
        }
        Ok(())
    }

    /// Returns entries claimed by this pass to pending
    async fn release_claimed(&self) {
        match self
            .store
            .move_status(EntryStatus::Processing, EntryStatus::Pending, false)
            .await
        {
            Ok(0) => {}
            Ok(released) => debug!(released, "Released claimed entries"),
            Err(e) => error!(error = %format!("{e:#}"), "Failed to release claimed entries"),
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Returns entries left `processing` by an interrupted drain to pending
    ///
    /// Call once at startup, before the first drain.
    pub async fn recover(&self) -> Result<u64, SyncError> {
        let recovered = self
            .store
            .move_status(EntryStatus::Processing, EntryStatus::Pending, false)
            .await?;
        if recovered > 0 {
            info!(recovered, "Recovered interrupted entries");
        }
        self.publish_counts().await;
        Ok(recovered)
    }

    /// Requeues every failed entry with a fresh retry budget
    pub async fn retry_failed(&self) -> Result<u64, SyncError> {
        let requeued = self
            .store
            .move_status(EntryStatus::Failed, EntryStatus::Pending, true)
            .await?;
        info!(requeued, "Requeued failed entries");
        self.publish_counts().await;
        Ok(requeued)
    }

    /// Discards every failed entry
    pub async fn clear_failed(&self) -> Result<u64, SyncError> {
        let removed = self.store.delete_by_status(EntryStatus::Failed).await?;
        info!(removed, "Cleared failed entries");
        self.publish_counts().await;
        Ok(removed)
    }

    /// Empties the queue; used on logout so nothing replays under another identity
    pub async fn discard_all(&self) -> Result<u64, SyncError> {
        let removed = self.store.clear().await?;
        warn!(removed, "Discarded all queued operations");
        self.publish_counts().await;
        Ok(removed)
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current counts, read from the store
    pub async fn counts(&self) -> Result<QueueCounts, SyncError> {
        Ok(self.store.count_by_status().await?)
    }

    /// Every entry, oldest first
    pub async fn entries(&self) -> Result<Vec<QueueEntry>, SyncError> {
        Ok(self.store.list_all().await?)
    }

    /// Subscribes to count changes
    ///
    /// The receiver holds the latest counts and is notified after every
    /// enqueue, drain and maintenance operation.
    pub fn subscribe(&self) -> watch::Receiver<QueueCounts> {
        self.counts_tx.subscribe()
    }

    async fn publish_counts(&self) {
        match self.store.count_by_status().await {
            Ok(counts) => {
                self.counts_tx.send_replace(counts);
            }
            Err(e) => warn!(error = %format!("{e:#}"), "Failed to refresh queue counts"),
        }
    }
}
