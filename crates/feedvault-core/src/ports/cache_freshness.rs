//! Cache freshness port
//!
//! Persisted `{identity -> last_hydrated_at}` markers. Whether a user's
//! local cache has already been hydrated is answered by this table, not by
//! state living in process memory.

use chrono::{DateTime, Duration, Utc};

/// Port trait for cache-hydration markers
#[async_trait::async_trait]
pub trait ICacheFreshness: Send + Sync {
    /// When the cache for `identity` was last hydrated, if ever
    async fn last_hydrated(&self, identity: &str) -> anyhow::Result<Option<DateTime<Utc>>>;

    /// Records a hydration of the cache for `identity`
    async fn mark_hydrated(&self, identity: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Returns true if `identity` was hydrated within `max_age`
    async fn is_fresh(&self, identity: &str, max_age: Duration) -> anyhow::Result<bool> {
        Ok(self
            .last_hydrated(identity)
            .await?
            .is_some_and(|at| Utc::now() - at <= max_age))
    }

    /// Forgets the marker for `identity`
    async fn clear(&self, identity: &str) -> anyhow::Result<()>;

    /// Forgets every marker
    async fn clear_all(&self) -> anyhow::Result<()>;
}
