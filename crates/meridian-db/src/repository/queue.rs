//! # Retry Queue Repository
//!
//! Durable storage for records held back by unmet dependencies.
//!
//! ## Queue Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       sync_queue Table                                  │
//! │                                                                         │
//! │  id | table_name | record_id | payload | missing | attempts | exhausted│
//! │  ───┼────────────┼───────────┼─────────┼─────────┼──────────┼──────────│
//! │  1  │ jobs       │ job-001   │ {...}   │ [cust..]│ 2        │ 0        │
//! │  2  │ invoices   │ inv-004   │ {...}   │ [job...]│ 0        │ 0        │
//! │  3  │ jobs       │ job-007   │ {...}   │ [svc...]│ 11       │ 1        │
//! │                                                                         │
//! │  Sweeps read exhausted = 0 ordered by enqueued_at_ms (FIFO) so an      │
//! │  old entry cannot starve behind newer arrivals. Entries whose          │
//! │  dependencies resolve are applied and deleted; the rest accumulate     │
//! │  attempts until the threshold marks them exhausted.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{MissingDependency, QueueEntry, SyncTable};

/// A raw sync_queue row.
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    table_name: String,
    record_id: String,
    payload: String,
    missing_deps: String,
    attempts: i64,
    exhausted: i64,
    enqueued_at_ms: i64,
    last_attempt_at_ms: Option<i64>,
}

impl QueueRow {
    fn decode(self) -> DbResult<QueueEntry> {
        let table: SyncTable = self
            .table_name
            .parse()
            .map_err(|_| DbError::corrupt("sync_queue", format!("table '{}'", self.table_name)))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt("sync_queue", format!("payload not JSON: {e}")))?;
        let missing: Vec<MissingDependency> = serde_json::from_str(&self.missing_deps)
            .map_err(|e| DbError::corrupt("sync_queue", format!("missing_deps not JSON: {e}")))?;
        let enqueued_at = DateTime::from_timestamp_millis(self.enqueued_at_ms)
            .ok_or_else(|| DbError::corrupt("sync_queue", "enqueued_at out of range"))?;
        let last_attempt_at = self
            .last_attempt_at_ms
            .map(|ms| {
                DateTime::from_timestamp_millis(ms)
                    .ok_or_else(|| DbError::corrupt("sync_queue", "last_attempt_at out of range"))
            })
            .transpose()?;

        Ok(QueueEntry {
            id: self.id,
            table,
            record_id: self.record_id,
            payload,
            missing,
            attempts: self.attempts,
            exhausted: self.exhausted != 0,
            enqueued_at,
            last_attempt_at,
        })
    }
}

const QUEUE_COLUMNS: &str = "id, table_name, record_id, payload, missing_deps, attempts, \
                             exhausted, enqueued_at_ms, last_attempt_at_ms";

/// Repository for retry queue operations.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        QueueRepository { pool }
    }

    /// Queues a record whose dependencies were unmet.
    ///
    /// One live entry per `(table, record)`: re-enqueueing refreshes the
    /// payload and missing list and resets the attempt counter, so the
    /// freshest version is what eventually gets applied.
    pub async fn enqueue(&self, entry: &QueueEntry) -> DbResult<()> {
        debug!(
            table = %entry.table,
            record_id = %entry.record_id,
            missing = entry.missing.len(),
            "Queuing record with unmet dependencies"
        );

        let missing = serde_json::to_string(&entry.missing)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO sync_queue (id, table_name, record_id, payload, missing_deps, \
                                     attempts, exhausted, enqueued_at_ms, last_attempt_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(table_name, record_id) DO UPDATE SET \
                 payload = excluded.payload, \
                 missing_deps = excluded.missing_deps, \
                 attempts = 0, \
                 exhausted = 0",
        )
        .bind(&entry.id)
        .bind(entry.table.as_str())
        .bind(&entry.record_id)
        .bind(entry.payload.to_string())
        .bind(missing)
        .bind(entry.attempts)
        .bind(entry.exhausted as i64)
        .bind(entry.enqueued_at.timestamp_millis())
        .bind(entry.last_attempt_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Entries eligible for the next sweep: not exhausted, FIFO by enqueue
    /// time, capped at `limit`.
    pub async fn due(&self, limit: u32) -> DbResult<Vec<QueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue \
             WHERE exhausted = 0 \
             ORDER BY enqueued_at_ms ASC \
             LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::decode).collect()
    }

    /// Removes an entry after its record was applied (or superseded).
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a failed retry: bumps attempts, refreshes the missing list,
    /// and flips to exhausted past the threshold.
    pub async fn record_attempt(
        &self,
        id: &str,
        missing: &[MissingDependency],
        exhausted: bool,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        let missing = serde_json::to_string(missing)
            .map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            "UPDATE sync_queue SET \
                 attempts = attempts + 1, \
                 missing_deps = ?2, \
                 exhausted = ?3, \
                 last_attempt_at_ms = ?4 \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(missing)
        .bind(exhausted as i64)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries (exhausted included), FIFO, for the queue inspection
    /// endpoint.
    pub async fn snapshot(&self, limit: u32) -> DbResult<Vec<QueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(&format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue \
             ORDER BY enqueued_at_ms ASC \
             LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(QueueRow::decode).collect()
    }

    /// Counts (live, exhausted) entries.
    pub async fn depth(&self) -> DbResult<(i64, i64)> {
        let live: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE exhausted = 0")
                .fetch_one(&self.pool)
                .await?;
        let exhausted: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE exhausted = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok((live, exhausted))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::SyncRecord;
    use serde_json::json;

    fn entry(record_id: &str, enqueued_at: &str) -> QueueEntry {
        let record = SyncRecord::from_value(json!({
            "id": record_id,
            "deviceId": "device-a",
            "updatedAt": enqueued_at,
            "customerId": "cust-9"
        }))
        .unwrap();
        QueueEntry::new(
            SyncTable::Jobs,
            &record,
            vec![MissingDependency {
                table: SyncTable::Customers,
                id: "cust-9".to_string(),
            }],
            record.updated_at,
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_sweep_order_is_fifo() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().queue();

        repo.enqueue(&entry("job-2", "2026-03-01T10:05:00Z")).await.unwrap();
        repo.enqueue(&entry("job-1", "2026-03-01T10:00:00Z")).await.unwrap();

        let due = repo.due(10).await.unwrap();
        assert_eq!(
            due.iter().map(|e| e.record_id.as_str()).collect::<Vec<_>>(),
            vec!["job-1", "job-2"]
        );
    }

    #[tokio::test]
    async fn test_reenqueue_same_record_replaces_entry() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().queue();

        repo.enqueue(&entry("job-1", "2026-03-01T10:00:00Z")).await.unwrap();
        repo.enqueue(&entry("job-1", "2026-03-01T10:09:00Z")).await.unwrap();

        let due = repo.due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].record_id, "job-1");
    }

    #[tokio::test]
    async fn test_exhausted_entries_leave_the_sweep() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().queue();
        let e = entry("job-1", "2026-03-01T10:00:00Z");
        repo.enqueue(&e).await.unwrap();

        repo.record_attempt(&e.id, &e.missing, true, Utc::now())
            .await
            .unwrap();

        assert!(repo.due(10).await.unwrap().is_empty());

        // but stays visible in the snapshot and depth counts
        let snapshot = repo.snapshot(10).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].exhausted);
        assert_eq!(repo.depth().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().queue();
        let e = entry("job-1", "2026-03-01T10:00:00Z");
        repo.enqueue(&e).await.unwrap();
        repo.delete(&e.id).await.unwrap();
        assert_eq!(repo.depth().await.unwrap(), (0, 0));
    }
}
