//! Record dispatcher port
//!
//! The dispatcher maps one queue entry onto the repository call for its
//! collection and operation. It returns the structured [`RepositoryError`]
//! rather than `anyhow::Error` so the queue can classify failures by kind.

use crate::domain::{QueueEntry, RepositoryError};

/// Port trait for performing a queued mutation against the repository
#[async_trait::async_trait]
pub trait IRecordDispatcher: Send + Sync {
    /// Performs the entry's operation
    ///
    /// Replay-protection challenges are absorbed by the implementation; an
    /// `Err` is always a real failure.
    async fn dispatch(&self, entry: &QueueEntry) -> Result<(), RepositoryError>;
}
