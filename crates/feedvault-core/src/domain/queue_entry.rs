//! QueueEntry domain entity
//!
//! A `QueueEntry` is one user mutation that has not yet been confirmed by
//! the remote repository. At most one entry exists per
//! `(collection, key)` pair; newer intent for the same logical record is
//! folded into the existing entry at enqueue time.
//!
//! ## State Machine
//!
//! ```text
//!                 drain picks up
//!   ┌─────────┐ ───────────────► ┌────────────┐  success   (entry deleted)
//!   │ Pending │                  │ Processing │ ─────────►
//!   └─────────┘ ◄─────────────── └────────────┘
//!        ▲        retryable,           │
//!        │        below ceiling        │ permanent, or ceiling reached
//!        │                             ▼
//!        │      retry_failed()   ┌──────────┐
//!        └────────────────────── │  Failed  │
//!                                └──────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;
use super::newtypes::{EntryId, RecordKey};

// ============================================================================
// Operation
// ============================================================================

/// Kind of mutation captured by a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Returns the storage name of this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Logical record type a queue entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    /// Per-article read state (read position, starred flag)
    ReadPosition,
    /// An article shared by the user
    Share,
    /// A followed account
    Follow,
    /// A subscribed feed
    Subscription,
}

impl Collection {
    /// All known collections
    pub const ALL: [Collection; 4] = [
        Collection::ReadPosition,
        Collection::Share,
        Collection::Follow,
        Collection::Subscription,
    ];

    /// Returns the storage / CLI name of this collection
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ReadPosition => "read-position",
            Collection::Share => "share",
            Collection::Follow => "follow",
            Collection::Subscription => "subscription",
        }
    }

    /// Returns the record namespace id used in the repository
    pub fn nsid(&self) -> &'static str {
        match self {
            Collection::ReadPosition => "app.feedvault.readPosition",
            Collection::Share => "app.feedvault.share",
            Collection::Follow => "app.feedvault.follow",
            Collection::Subscription => "app.feedvault.subscription",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCollection(s.to_string()))
    }
}

// ============================================================================
// EntryStatus
// ============================================================================

/// Processing status of a queue entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for the next drain
    #[default]
    Pending,
    /// Dispatched by the drain currently in progress
    Processing,
    /// Terminally failed; only an explicit retry requeues it
    Failed,
}

impl EntryStatus {
    /// Returns the storage name of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Processing => "processing",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "processing" => Ok(EntryStatus::Processing),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// QueueCounts
// ============================================================================

/// Number of queue entries in each status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// Entries not yet confirmed by the repository and not parked as failed
    pub fn pending_count(&self) -> u64 {
        self.pending + self.processing
    }

    /// Entries parked as failed
    pub fn failed_count(&self) -> u64 {
        self.failed
    }

    /// Total number of entries in the queue
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.failed
    }
}

// ============================================================================
// QueueEntry
// ============================================================================

/// One not-yet-confirmed mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    id: EntryId,
    operation: Operation,
    collection: Collection,
    key: RecordKey,
    payload: serde_json::Value,
    /// Logical ordering value, strictly monotonic per enqueue
    timestamp: i64,
    retry_count: u32,
    status: EntryStatus,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Creates a new pending entry
    pub fn new(
        operation: Operation,
        collection: Collection,
        key: RecordKey,
        payload: serde_json::Value,
        timestamp: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            operation,
            collection,
            key,
            payload,
            timestamp,
            retry_count: 0,
            status: EntryStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an entry from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: EntryId,
        operation: Operation,
        collection: Collection,
        key: RecordKey,
        payload: serde_json::Value,
        timestamp: i64,
        retry_count: u32,
        status: EntryStatus,
        last_error: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            operation,
            collection,
            key,
            payload,
            timestamp,
            retry_count,
            status,
            last_error,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// Message of the most recent failed attempt, if any
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Overwrites the entry's intent in place
    ///
    /// The entry returns to `Pending` with a fresh retry budget: the new
    /// intent has never been attempted.
    pub fn apply(&mut self, operation: Operation, payload: serde_json::Value, timestamp: i64) {
        self.operation = operation;
        self.payload = payload;
        self.timestamp = timestamp;
        self.status = EntryStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    /// Returns true if the given transition is allowed
    pub fn can_transition_to(&self, target: EntryStatus) -> bool {
        matches!(
            (self.status, target),
            (EntryStatus::Pending, EntryStatus::Processing)
                | (EntryStatus::Processing, EntryStatus::Pending)
                | (EntryStatus::Processing, EntryStatus::Failed)
                | (EntryStatus::Failed, EntryStatus::Pending)
        )
    }

    fn transition_to(&mut self, target: EntryStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the entry as dispatched by the running drain
    pub fn start_processing(&mut self) -> Result<(), DomainError> {
        self.transition_to(EntryStatus::Processing)
    }

    /// Records a retryable failure
    ///
    /// Increments the retry count. Returns the entry to `Pending` while the
    /// count is below `max_retries`, otherwise parks it as `Failed`.
    pub fn record_retryable_failure(
        &mut self,
        message: impl Into<String>,
        max_retries: u32,
    ) -> Result<EntryStatus, DomainError> {
        let target = if self.retry_count + 1 >= max_retries {
            EntryStatus::Failed
        } else {
            EntryStatus::Pending
        };
        self.transition_to(target)?;
        self.retry_count += 1;
        self.last_error = Some(message.into());
        Ok(target)
    }

    /// Records a failure that must not be retried automatically
    pub fn record_permanent_failure(
        &mut self,
        message: impl Into<String>,
    ) -> Result<(), DomainError> {
        self.transition_to(EntryStatus::Failed)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Returns an interrupted `Processing` entry to `Pending` without
    /// charging a retry
    pub fn release(&mut self) -> Result<(), DomainError> {
        if self.status != EntryStatus::Processing {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: EntryStatus::Pending.to_string(),
            });
        }
        self.transition_to(EntryStatus::Pending)
    }

    /// Requeues a failed entry with a fresh retry budget
    pub fn requeue(&mut self) -> Result<(), DomainError> {
        if self.status != EntryStatus::Failed {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: EntryStatus::Pending.to_string(),
            });
        }
        self.transition_to(EntryStatus::Pending)?;
        self.retry_count = 0;
        Ok(())
    }
}
