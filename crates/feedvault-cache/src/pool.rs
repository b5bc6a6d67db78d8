//! SQLite pool for the queue database
//!
//! File databases run in WAL mode so `status` and `queue list` can read while
//! a `run` process is writing. Schema migrations are applied on every open.
//! `in_memory` backs the tests.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

/// Ordered schema migrations
const MIGRATIONS: &[(&str, &str)] = &[(
    "20261016_offline_queue",
    include_str!("migrations/20261016_offline_queue.sql"),
)];

/// Connections kept open against a database file
const FILE_MAX_CONNECTIONS: u32 = 4;

/// How long a writer waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool over the queue database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path`
    ///
    /// Missing parent directories are created first.
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the file cannot be opened,
    /// `CacheError::MigrationFailed` when the schema cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // WAL keeps committed queue writes durable at NORMAL.
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Cannot open {}: {e}", db_path.display()))
            })?;

        Self::run_migrations(&pool).await?;
        tracing::info!(path = %db_path.display(), "Opened queue database");

        Ok(Self { pool })
    }

    /// Opens a private in-memory database
    ///
    /// Each SQLite in-memory database belongs to one connection, so the pool
    /// holds exactly one and never recycles it.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Cannot open in-memory database: {e}"))
            })?;

        Self::run_migrations(&pool).await?;
        tracing::debug!("Opened in-memory queue database");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runs the schema migrations
    ///
    /// Every statement is idempotent, so this is safe on every startup.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to run migration {name}: {e}"))
            })?;
            tracing::trace!(migration = name, "Applied migration");
        }

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}
