//! Queue store port (driven/secondary port)
//!
//! This module defines the interface for persisting queue entries.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, etc.) and don't need domain-level classification.
//! - The store enforces uniqueness of `(collection, key)`; the queue relies
//!   on it as a backstop, while the conflict resolver keeps it true.
//! - The `*_if_unchanged` variants compare the entry's `timestamp`, which
//!   changes on every enqueue. They let a drain finish its bookkeeping
//!   without clobbering newer intent enqueued while a request was in flight.

use crate::domain::{Collection, EntryId, EntryStatus, QueueCounts, QueueEntry, RecordKey};

/// Port trait for durable queue storage
#[async_trait::async_trait]
pub trait IQueueStore: Send + Sync {
    /// Inserts a new entry
    ///
    /// Fails if an entry already exists for the same `(collection, key)`.
    async fn insert(&self, entry: &QueueEntry) -> anyhow::Result<()>;

    /// Point lookup by logical key
    async fn find_by_key(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> anyhow::Result<Option<QueueEntry>>;

    /// Lists entries with the given status, ordered by timestamp (oldest first)
    async fn list_by_status(&self, status: EntryStatus) -> anyhow::Result<Vec<QueueEntry>>;

    /// Lists every entry, ordered by timestamp (oldest first)
    async fn list_all(&self) -> anyhow::Result<Vec<QueueEntry>>;

    /// Overwrites the stored entry with the same id
    async fn update(&self, entry: &QueueEntry) -> anyhow::Result<()>;

    /// Overwrites the stored entry only if its timestamp still equals
    /// `expected_timestamp`
    ///
    /// Returns `false` when the row was changed or removed in the meantime.
    async fn update_if_unchanged(
        &self,
        entry: &QueueEntry,
        expected_timestamp: i64,
    ) -> anyhow::Result<bool>;

    /// Deletes an entry by id
    async fn delete(&self, id: &EntryId) -> anyhow::Result<()>;

    /// Deletes an entry only if its timestamp still equals `expected_timestamp`
    async fn delete_if_unchanged(
        &self,
        id: &EntryId,
        expected_timestamp: i64,
    ) -> anyhow::Result<bool>;

    /// Counts entries grouped by status
    async fn count_by_status(&self) -> anyhow::Result<QueueCounts>;

    /// Largest timestamp currently stored, if any
    async fn max_timestamp(&self) -> anyhow::Result<Option<i64>>;

    /// Deletes every entry with the given status, returning how many were removed
    async fn delete_by_status(&self, status: EntryStatus) -> anyhow::Result<u64>;

    /// Moves every entry from `from` to `to`
    ///
    /// When `reset_retries` is set the retry count of moved entries is
    /// zeroed. Returns how many entries were moved.
    async fn move_status(
        &self,
        from: EntryStatus,
        to: EntryStatus,
        reset_retries: bool,
    ) -> anyhow::Result<u64>;

    /// Deletes every entry, returning how many were removed
    async fn clear(&self) -> anyhow::Result<u64>;
}
