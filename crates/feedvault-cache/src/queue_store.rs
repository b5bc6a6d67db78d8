//! SQLite implementation of IQueueStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                   |
//! |-----------------|----------|--------------------------------------------|
//! | EntryId         | TEXT     | UUID string via `to_string()` / `FromStr`  |
//! | Operation       | TEXT     | `as_str()` / `FromStr`                     |
//! | Collection      | TEXT     | `as_str()` / `FromStr`                     |
//! | RecordKey       | TEXT     | `as_str()` / `RecordKey::new()`            |
//! | payload (Value) | TEXT     | serde_json serialization                   |
//! | EntryStatus     | TEXT     | `as_str()` / `FromStr`                     |
//! | DateTime<Utc>   | TEXT     | RFC 3339 via `to_rfc3339()`                |

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use feedvault_core::domain::{
    Collection, EntryId, EntryStatus, Operation, QueueCounts, QueueEntry, RecordKey,
};
use feedvault_core::ports::IQueueStore;

use crate::CacheError;

const SELECT_COLUMNS: &str = "SELECT id, operation, collection, record_key, payload, timestamp, \
     retry_count, status, last_error, created_at, updated_at FROM queue_entries";

/// SQLite-based queue storage
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{s}': {e}"))
        })
}

fn domain_err(e: impl std::fmt::Display) -> CacheError {
    CacheError::SerializationError(e.to_string())
}

fn entry_from_row(row: &SqliteRow) -> Result<QueueEntry, CacheError> {
    let id: String = row.get("id");
    let operation: String = row.get("operation");
    let collection: String = row.get("collection");
    let record_key: String = row.get("record_key");
    let payload: String = row.get("payload");
    let timestamp: i64 = row.get("timestamp");
    let retry_count: i64 = row.get("retry_count");
    let status: String = row.get("status");
    let last_error: Option<String> = row.get("last_error");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(QueueEntry::restore(
        EntryId::from_str(&id).map_err(domain_err)?,
        Operation::from_str(&operation).map_err(domain_err)?,
        Collection::from_str(&collection).map_err(domain_err)?,
        RecordKey::new(record_key).map_err(domain_err)?,
        serde_json::from_str(&payload)
            .map_err(|e| CacheError::SerializationError(format!("Invalid payload: {e}")))?,
        timestamp,
        u32::try_from(retry_count).map_err(domain_err)?,
        EntryStatus::from_str(&status).map_err(domain_err)?,
        last_error,
        parse_datetime(&created_at)?,
        parse_datetime(&updated_at)?,
    ))
}

fn entries_from_rows(rows: &[SqliteRow]) -> Result<Vec<QueueEntry>, CacheError> {
    rows.iter().map(entry_from_row).collect()
}

// ============================================================================
// IQueueStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IQueueStore for SqliteQueueStore {
    async fn insert(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        let payload = serde_json::to_string(entry.payload())?;

        sqlx::query(
            "INSERT INTO queue_entries \
             (id, operation, collection, record_key, payload, timestamp, \
              retry_count, status, last_error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id().to_string())
        .bind(entry.operation().as_str())
        .bind(entry.collection().as_str())
        .bind(entry.key().as_str())
        .bind(&payload)
        .bind(entry.timestamp())
        .bind(i64::from(entry.retry_count()))
        .bind(entry.status().as_str())
        .bind(entry.last_error())
        .bind(entry.created_at().to_rfc3339())
        .bind(entry.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(entry_id = %entry.id(), "Inserted queue entry");
        Ok(())
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> anyhow::Result<Option<QueueEntry>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE collection = ? AND record_key = ?"
        ))
        .bind(collection.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(entry_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_status(&self, status: EntryStatus) -> anyhow::Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = ? ORDER BY timestamp ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries_from_rows(&rows)?)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<QueueEntry>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY timestamp ASC"))
            .fetch_all(&self.pool)
            .await?;

        Ok(entries_from_rows(&rows)?)
    }

    async fn update(&self, entry: &QueueEntry) -> anyhow::Result<()> {
        let payload = serde_json::to_string(entry.payload())?;

        let result = sqlx::query(
            "UPDATE queue_entries SET operation = ?, payload = ?, timestamp = ?, \
             retry_count = ?, status = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(entry.operation().as_str())
        .bind(&payload)
        .bind(entry.timestamp())
        .bind(i64::from(entry.retry_count()))
        .bind(entry.status().as_str())
        .bind(entry.last_error())
        .bind(entry.updated_at().to_rfc3339())
        .bind(entry.id().to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Queue entry not found: {}", entry.id());
        }
        tracing::trace!(entry_id = %entry.id(), status = %entry.status(), "Updated queue entry");
        Ok(())
    }

    async fn update_if_unchanged(
        &self,
        entry: &QueueEntry,
        expected_timestamp: i64,
    ) -> anyhow::Result<bool> {
        let payload = serde_json::to_string(entry.payload())?;

        let result = sqlx::query(
            "UPDATE queue_entries SET operation = ?, payload = ?, timestamp = ?, \
             retry_count = ?, status = ?, last_error = ?, updated_at = ? \
             WHERE id = ? AND timestamp = ?",
        )
        .bind(entry.operation().as_str())
        .bind(&payload)
        .bind(entry.timestamp())
        .bind(i64::from(entry.retry_count()))
        .bind(entry.status().as_str())
        .bind(entry.last_error())
        .bind(entry.updated_at().to_rfc3339())
        .bind(entry.id().to_string())
        .bind(expected_timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &EntryId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM queue_entries WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        tracing::trace!(entry_id = %id, "Deleted queue entry");
        Ok(())
    }

    async fn delete_if_unchanged(
        &self,
        id: &EntryId,
        expected_timestamp: i64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE id = ? AND timestamp = ?")
            .bind(id.to_string())
            .bind(expected_timestamp)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_by_status(&self) -> anyhow::Result<QueueCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM queue_entries GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts = QueueCounts::default();
        for row in &rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let count = u64::try_from(count).unwrap_or(0);
            match EntryStatus::from_str(&status).map_err(domain_err)? {
                EntryStatus::Pending => counts.pending = count,
                EntryStatus::Processing => counts.processing = count,
                EntryStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    async fn max_timestamp(&self) -> anyhow::Result<Option<i64>> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM queue_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    async fn delete_by_status(&self, status: EntryStatus) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE status = ?")
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        tracing::debug!(status = %status, removed = result.rows_affected(), "Deleted queue entries");
        Ok(result.rows_affected())
    }

    async fn move_status(
        &self,
        from: EntryStatus,
        to: EntryStatus,
        reset_retries: bool,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE queue_entries SET status = ?, \
             retry_count = CASE WHEN ? THEN 0 ELSE retry_count END, \
             updated_at = ? WHERE status = ?",
        )
        .bind(to.as_str())
        .bind(reset_retries)
        .bind(Utc::now().to_rfc3339())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            from = %from,
            to = %to,
            moved = result.rows_affected(),
            "Moved queue entries"
        );
        Ok(result.rows_affected())
    }

    async fn clear(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM queue_entries")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
