//! Feedvault Sync - Offline write reconciliation
//!
//! Provides:
//! - The durable operation queue: enqueue with conflict collapse, single-flight
//!   drain, retry accounting and terminal-failure bookkeeping
//! - An online/offline signal
//! - The scheduler that turns connectivity changes, timer ticks and manual
//!   requests into drains
//!
//! ## Modules
//!
//! - [`queue`] - [`OperationQueue`] and its [`DrainReport`]
//! - [`connectivity`] - [`ConnectivityMonitor`]
//! - [`scheduler`] - [`DrainScheduler`] and [`SyncHandle`]

pub mod connectivity;
pub mod queue;
pub mod scheduler;

pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use queue::{DrainReport, DrainState, EnqueueOutcome, OperationQueue};
pub use scheduler::{DrainScheduler, SyncHandle};

use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backing store failed
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// A domain-level error propagated from feedvault-core
    #[error("Domain error: {0}")]
    DomainError(#[from] feedvault_core::domain::DomainError),
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Storage(err)
    }
}
