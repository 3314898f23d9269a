//! # Record Store Repository
//!
//! Generic persistence over the synchronized domain tables. Every table
//! shares the same physical shape, so one repository serves them all, keyed
//! by the closed [`SyncTable`] enum.
//!
//! ## Same-Record Serialization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Guarded Upsert (storage-layer CAS)                         │
//! │                                                                         │
//! │  Device A ─ upload c1 @ T1 ─┐                                          │
//! │                             ▼                                           │
//! │            INSERT .. ON CONFLICT(id) DO UPDATE ..                      │
//! │            WHERE excluded.updated_at_ms > updated_at_ms                │
//! │                             ▲                                           │
//! │  Device B ─ upload c1 @ T2 ─┘                                          │
//! │                                                                         │
//! │  One SQL statement per record version: SQLite serializes the two       │
//! │  writes, the WHERE clause decides, and the outcome is identical        │
//! │  regardless of arrival order. rows_affected reports the decision.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Table names are interpolated into SQL strings; that is safe here because
//! they come from `SyncTable::as_str()`, never from request input.

use std::collections::HashSet;

use chrono::DateTime;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{SyncRecord, SyncStatus, SyncTable};
use meridian_core::record::Watermark;

/// A raw row of any synchronized table.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: String,
    device_id: String,
    updated_at_ms: i64,
    sync_status: String,
    payload: String,
}

impl RecordRow {
    /// Decodes the row back into a validated record + status pair.
    fn decode(self, table: SyncTable) -> DbResult<(SyncRecord, SyncStatus)> {
        let updated_at = DateTime::from_timestamp_millis(self.updated_at_ms)
            .ok_or_else(|| DbError::corrupt(table.as_str(), "timestamp out of range"))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt(table.as_str(), format!("payload not JSON: {e}")))?;
        let status = SyncStatus::parse(&self.sync_status)
            .map_err(|e| DbError::corrupt(table.as_str(), e.to_string()))?;

        Ok((
            SyncRecord {
                id: self.id,
                device_id: self.device_id,
                updated_at,
                payload,
            },
            status,
        ))
    }
}

const RECORD_COLUMNS: &str = "id, device_id, updated_at_ms, sync_status, payload";

/// Repository over the synchronized domain tables.
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Fetches one record by id.
    pub async fn get(&self, table: SyncTable, id: &str) -> DbResult<Option<SyncRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id = ?1",
            table.as_str()
        );
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.decode(table).map(|(record, _)| record))
            .transpose()
    }

    /// Returns which of `ids` exist in `table`.
    ///
    /// One query per call; the dependency resolver batches its existence
    /// checks through here.
    pub async fn existing_ids(
        &self,
        table: SyncTable,
        ids: &[String],
    ) -> DbResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT id FROM {} WHERE id IN (", table.as_str()));
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");

        let found: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(found.into_iter().collect())
    }

    /// Applies a record version if and only if it is strictly newer than the
    /// stored copy (or no copy exists). Returns whether it was applied.
    ///
    /// This is the single atomic statement the conflict resolver's decision
    /// must be equivalent to; concurrent writes to the same id serialize
    /// here regardless of arrival order.
    pub async fn apply_if_newer(&self, table: SyncTable, record: &SyncRecord) -> DbResult<bool> {
        let sql = format!(
            "INSERT INTO {t} (id, device_id, updated_at_ms, sync_status, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
                 device_id = excluded.device_id, \
                 updated_at_ms = excluded.updated_at_ms, \
                 sync_status = excluded.sync_status, \
                 payload = excluded.payload \
             WHERE excluded.updated_at_ms > {t}.updated_at_ms",
            t = table.as_str()
        );

        let payload = record.payload.to_string();
        let result = sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.device_id)
            .bind(record.updated_at_ms())
            .bind(SyncStatus::Synced.as_str())
            .bind(payload)
            .execute(&self.pool)
            .await?;

        let applied = result.rows_affected() > 0;
        debug!(
            table = %table,
            record_id = %record.id,
            applied,
            "Conditional record apply"
        );
        Ok(applied)
    }

    /// Stores a locally-originated record as `pending`, overwriting any
    /// previous local version. This is the device-side CRUD write path;
    /// it never consults the conflict policy.
    pub async fn store_pending(&self, table: SyncTable, record: &SyncRecord) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO {t} (id, device_id, updated_at_ms, sync_status, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
                 device_id = excluded.device_id, \
                 updated_at_ms = excluded.updated_at_ms, \
                 sync_status = excluded.sync_status, \
                 payload = excluded.payload",
            t = table.as_str()
        );

        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.device_id)
            .bind(record.updated_at_ms())
            .bind(SyncStatus::Pending.as_str())
            .bind(record.payload.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Fetches records strictly after the watermark tuple, excluding those
    /// originated by `exclude_device` (no self-echo), ordered by
    /// `(updated_at, id)` ascending, capped at `limit`.
    pub async fn fetch_since(
        &self,
        table: SyncTable,
        mark: &Watermark,
        exclude_device: &str,
        limit: u32,
    ) -> DbResult<Vec<SyncRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} \
             WHERE (updated_at_ms > ?1 OR (updated_at_ms = ?1 AND id > ?2)) \
               AND device_id <> ?3 \
             ORDER BY updated_at_ms ASC, id ASC \
             LIMIT ?4",
            table.as_str()
        );

        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(mark.updated_at_ms())
            .bind(&mark.id)
            .bind(exclude_device)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| r.decode(table).map(|(record, _)| record))
            .collect()
    }

    /// Fetches a set of records by id (order unspecified).
    pub async fn fetch_by_ids(
        &self,
        table: SyncTable,
        ids: &[String],
    ) -> DbResult<Vec<SyncRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id IN (",
            table.as_str()
        ));
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");

        let rows: Vec<RecordRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| r.decode(table).map(|(record, _)| record))
            .collect()
    }

    /// Lists records currently in `status`, oldest first.
    ///
    /// The device agent uses this to collect `pending` rows for upload.
    pub async fn list_by_status(
        &self,
        table: SyncTable,
        status: SyncStatus,
        limit: u32,
    ) -> DbResult<Vec<SyncRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} \
             WHERE sync_status = ?1 \
             ORDER BY updated_at_ms ASC, id ASC \
             LIMIT ?2",
            table.as_str()
        );

        let rows: Vec<RecordRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| r.decode(table).map(|(record, _)| record))
            .collect()
    }

    /// Sets the sync status of the given rows.
    pub async fn mark_status(
        &self,
        table: SyncTable,
        ids: &[String],
        status: SyncStatus,
    ) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {} SET sync_status = ", table.as_str()));
        qb.push_bind(status.as_str());
        qb.push(" WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id);
        }
        sep.push_unseparated(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Resurrects all `failed` rows of a table back to `pending` so the next
    /// upload pass re-sends them. Operator action, per the record lifecycle.
    pub async fn retry_failed(&self, table: SyncTable) -> DbResult<u64> {
        let sql = format!(
            "UPDATE {} SET sync_status = ?1 WHERE sync_status = ?2",
            table.as_str()
        );
        let result = sqlx::query(&sql)
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Failed.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Total rows in a table.
    pub async fn count(&self, table: SyncTable) -> DbResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    fn record(id: &str, device: &str, updated_at: &str) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": id,
            "deviceId": device,
            "updatedAt": updated_at,
            "name": "x"
        }))
        .unwrap()
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_and_get_round_trip() {
        let repo = db().await.records();
        let rec = record("c1", "device-a", "2026-03-01T10:00:00Z");

        assert!(repo.apply_if_newer(SyncTable::Customers, &rec).await.unwrap());

        let stored = repo.get(SyncTable::Customers, "c1").await.unwrap().unwrap();
        assert_eq!(stored.id, "c1");
        assert_eq!(stored.device_id, "device-a");
        assert_eq!(stored.updated_at, rec.updated_at);
    }

    #[tokio::test]
    async fn test_older_version_does_not_apply() {
        let repo = db().await.records();
        let newer = record("c1", "device-a", "2026-03-01T10:05:00Z");
        let older = record("c1", "device-b", "2026-03-01T10:00:00Z");

        assert!(repo.apply_if_newer(SyncTable::Customers, &newer).await.unwrap());
        assert!(!repo.apply_if_newer(SyncTable::Customers, &older).await.unwrap());

        let stored = repo.get(SyncTable::Customers, "c1").await.unwrap().unwrap();
        assert_eq!(stored.device_id, "device-a");
    }

    #[tokio::test]
    async fn test_equal_timestamp_keeps_stored_copy() {
        let repo = db().await.records();
        let first = record("c1", "device-a", "2026-03-01T10:00:00Z");
        let second = record("c1", "device-b", "2026-03-01T10:00:00Z");

        assert!(repo.apply_if_newer(SyncTable::Customers, &first).await.unwrap());
        assert!(!repo.apply_if_newer(SyncTable::Customers, &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_since_excludes_own_device_and_pages() {
        let repo = db().await.records();
        for (id, device, ts) in [
            ("c1", "device-a", "2026-03-01T10:00:00Z"),
            ("c2", "device-b", "2026-03-01T10:01:00Z"),
            ("c3", "device-b", "2026-03-01T10:02:00Z"),
        ] {
            repo.apply_if_newer(SyncTable::Customers, &record(id, device, ts))
                .await
                .unwrap();
        }

        // device-a never sees its own record back
        let page = repo
            .fetch_since(SyncTable::Customers, &Watermark::origin(), "device-a", 10)
            .await
            .unwrap();
        assert_eq!(
            page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["c2", "c3"]
        );

        // resuming from c2's watermark yields only c3
        let mark = Watermark {
            updated_at: page[0].updated_at,
            id: page[0].id.clone(),
        };
        let rest = repo
            .fetch_since(SyncTable::Customers, &mark, "device-a", 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "c3");
    }

    #[tokio::test]
    async fn test_equal_timestamps_are_not_skipped_across_pages() {
        let repo = db().await.records();
        // three records at the SAME timestamp
        for id in ["c1", "c2", "c3"] {
            repo.apply_if_newer(
                SyncTable::Customers,
                &record(id, "device-b", "2026-03-01T10:00:00Z"),
            )
            .await
            .unwrap();
        }

        let first = repo
            .fetch_since(SyncTable::Customers, &Watermark::origin(), "device-a", 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);

        let mark = Watermark {
            updated_at: first[1].updated_at,
            id: first[1].id.clone(),
        };
        let second = repo
            .fetch_since(SyncTable::Customers, &mark, "device-a", 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "c3");
    }

    #[tokio::test]
    async fn test_existing_ids() {
        let repo = db().await.records();
        repo.apply_if_newer(
            SyncTable::Customers,
            &record("c1", "device-a", "2026-03-01T10:00:00Z"),
        )
        .await
        .unwrap();

        let found = repo
            .existing_ids(
                SyncTable::Customers,
                &["c1".to_string(), "c2".to_string()],
            )
            .await
            .unwrap();
        assert!(found.contains("c1"));
        assert!(!found.contains("c2"));
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let repo = db().await.records();
        let rec = record("j1", "device-a", "2026-03-01T10:00:00Z");
        repo.store_pending(SyncTable::Jobs, &rec).await.unwrap();

        let pending = repo
            .list_by_status(SyncTable::Jobs, SyncStatus::Pending, 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        repo.mark_status(SyncTable::Jobs, &["j1".to_string()], SyncStatus::Failed)
            .await
            .unwrap();
        assert!(repo
            .list_by_status(SyncTable::Jobs, SyncStatus::Pending, 10)
            .await
            .unwrap()
            .is_empty());

        // operator resurrection: failed rows go back to pending
        let resurrected = repo.retry_failed(SyncTable::Jobs).await.unwrap();
        assert_eq!(resurrected, 1);
        assert_eq!(
            repo.list_by_status(SyncTable::Jobs, SyncStatus::Pending, 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
