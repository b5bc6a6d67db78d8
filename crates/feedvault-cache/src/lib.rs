//! Feedvault Cache - SQLite persistence
//!
//! Two tables live in one database file:
//! - `queue_entries`, the operations waiting to reach the repository
//!   ([`SqliteQueueStore`], the `IQueueStore` adapter)
//! - `cache_freshness`, when each identity's local cache was last rebuilt
//!   ([`SqliteCacheFreshness`], the `ICacheFreshness` adapter)
//!
//! ```no_run
//! use std::path::Path;
//! use feedvault_cache::{DatabasePool, SqliteQueueStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/tmp/feedvault/feedvault.db")).await?;
//! let store = SqliteQueueStore::new(pool.pool().clone());
//! # let _ = store;
//! # Ok(())
//! # }
//! ```

pub mod freshness;
pub mod pool;
pub mod queue_store;

pub use freshness::SqliteCacheFreshness;
pub use pool::DatabasePool;
pub use queue_store::SqliteQueueStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be mapped back to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
