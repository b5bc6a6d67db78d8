//! Wiring shared by the commands that touch the queue
//!
//! Opens the queue database, builds the repository client and record
//! dispatcher from the configuration, and reads the session from the
//! system keyring.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use feedvault_cache::{DatabasePool, SqliteCacheFreshness, SqliteQueueStore};
use feedvault_core::config::Config;
use feedvault_pds::{KeyringSessionStore, PdsRecordDispatcher, RepositoryClient};
use feedvault_sync::OperationQueue;

/// Loads the configuration
///
/// A missing file yields the defaults; a file that exists but does not
/// parse is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// Opened adapters plus the operation queue
pub struct AppContext {
    pub pool: DatabasePool,
    pub queue: Arc<OperationQueue>,
    pub sessions: Arc<KeyringSessionStore>,
    pub freshness: SqliteCacheFreshness,
}

impl AppContext {
    /// Validates `config` and opens everything the queue needs
    pub async fn open(config: &Config) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            anyhow::bail!("Invalid configuration: {}", messages.join("; "));
        }

        let pool = DatabasePool::new(&config.queue.database)
            .await
            .context("Failed to open queue database")?;
        info!(database = %config.queue.database.display(), "Opened queue database");

        let store = Arc::new(SqliteQueueStore::new(pool.pool().clone()));
        let freshness = SqliteCacheFreshness::new(pool.pool().clone());
        let sessions = Arc::new(KeyringSessionStore::new());

        let client = RepositoryClient::with_settings(
            Duration::from_secs(config.repository.request_timeout_secs),
            i64::try_from(config.repository.proof_lifetime_secs).unwrap_or(i64::MAX),
        );
        let dispatcher = Arc::new(PdsRecordDispatcher::new(client, sessions.clone()));

        let queue = OperationQueue::open(
            store,
            dispatcher,
            sessions.clone(),
            config.queue.max_retries,
        )
        .await
        .context("Failed to open operation queue")?;

        Ok(Self {
            pool,
            queue: Arc::new(queue),
            sessions,
            freshness,
        })
    }

    /// Flushes and closes the database
    pub async fn close(self) {
        self.pool.close().await;
    }
}
