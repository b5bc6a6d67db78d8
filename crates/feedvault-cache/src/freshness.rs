//! SQLite implementation of ICacheFreshness
//!
//! One row per identity in `cache_freshness`, holding the RFC 3339 time of
//! the last completed hydration.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use feedvault_core::ports::ICacheFreshness;

use crate::CacheError;

/// SQLite-based cache hydration markers
pub struct SqliteCacheFreshness {
    pool: SqlitePool,
}

impl SqliteCacheFreshness {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ICacheFreshness for SqliteCacheFreshness {
    async fn last_hydrated(&self, identity: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT last_hydrated_at FROM cache_freshness WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        match value {
            Some(s) => {
                let at = DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        CacheError::SerializationError(format!(
                            "Invalid hydration time for {identity}: {e}"
                        ))
                    })?;
                Ok(Some(at))
            }
            None => Ok(None),
        }
    }

    async fn mark_hydrated(&self, identity: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO cache_freshness (identity, last_hydrated_at) VALUES (?, ?) \
             ON CONFLICT(identity) DO UPDATE SET last_hydrated_at = excluded.last_hydrated_at",
        )
        .bind(identity)
        .bind(at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(identity, "Marked cache as hydrated");
        Ok(())
    }

    async fn clear(&self, identity: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM cache_freshness WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM cache_freshness")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
