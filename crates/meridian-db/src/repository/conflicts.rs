//! # Conflict Log Repository
//!
//! Append-only audit log of discarded record versions. Entries never mutate
//! domain state; they exist so last-write-wins losses stay inspectable.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{ConflictRecord, SyncTable};

/// A raw sync_conflicts row.
#[derive(Debug, sqlx::FromRow)]
struct ConflictRow {
    id: String,
    table_name: String,
    record_id: String,
    winner_device_id: String,
    loser_device_id: String,
    winner_updated_at_ms: i64,
    loser_updated_at_ms: i64,
    loser_payload: String,
    resolved_at_ms: i64,
}

impl ConflictRow {
    fn decode(self) -> DbResult<ConflictRecord> {
        let table: SyncTable = self.table_name.parse().map_err(|_| {
            DbError::corrupt("sync_conflicts", format!("table '{}'", self.table_name))
        })?;
        let ts = |ms: i64, what: &str| {
            DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| DbError::corrupt("sync_conflicts", format!("{what} out of range")))
        };

        Ok(ConflictRecord {
            id: self.id,
            table,
            record_id: self.record_id,
            winner_device_id: self.winner_device_id,
            loser_device_id: self.loser_device_id,
            winner_updated_at: ts(self.winner_updated_at_ms, "winner_updated_at")?,
            loser_updated_at: ts(self.loser_updated_at_ms, "loser_updated_at")?,
            loser_payload: serde_json::from_str(&self.loser_payload)
                .map_err(|e| DbError::corrupt("sync_conflicts", format!("payload: {e}")))?,
            resolved_at: ts(self.resolved_at_ms, "resolved_at")?,
        })
    }
}

/// Repository for the conflict audit log.
#[derive(Debug, Clone)]
pub struct ConflictRepository {
    pool: SqlitePool,
}

impl ConflictRepository {
    /// Creates a new ConflictRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ConflictRepository { pool }
    }

    /// Appends an audit entry for a discarded version.
    pub async fn append(&self, entry: &ConflictRecord) -> DbResult<()> {
        debug!(
            table = %entry.table,
            record_id = %entry.record_id,
            loser_device = %entry.loser_device_id,
            "Recording discarded version"
        );

        sqlx::query(
            "INSERT INTO sync_conflicts \
                 (id, table_name, record_id, winner_device_id, loser_device_id, \
                  winner_updated_at_ms, loser_updated_at_ms, loser_payload, resolved_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&entry.id)
        .bind(entry.table.as_str())
        .bind(&entry.record_id)
        .bind(&entry.winner_device_id)
        .bind(&entry.loser_device_id)
        .bind(entry.winner_updated_at.timestamp_millis())
        .bind(entry.loser_updated_at.timestamp_millis())
        .bind(entry.loser_payload.to_string())
        .bind(entry.resolved_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists entries resolved after `since` (if given), newest first.
    pub async fn list(
        &self,
        limit: u32,
        since: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<ConflictRecord>> {
        let since_ms = since.map_or(0, |t| t.timestamp_millis());

        let rows: Vec<ConflictRow> = sqlx::query_as(
            "SELECT id, table_name, record_id, winner_device_id, loser_device_id, \
                    winner_updated_at_ms, loser_updated_at_ms, loser_payload, resolved_at_ms \
             FROM sync_conflicts \
             WHERE resolved_at_ms > ?1 \
             ORDER BY resolved_at_ms DESC \
             LIMIT ?2",
        )
        .bind(since_ms)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConflictRow::decode).collect()
    }

    /// Total audit entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_conflicts")
            .fetch_one(&self.pool)
            .await?;
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
    use meridian_core::SyncRecord;
    use serde_json::json;

    fn record(device: &str, ts: &str) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": "c1",
            "deviceId": device,
            "updatedAt": ts,
            "balanceCents": 100
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().conflicts();

        let stored = record("device-a", "2026-03-01T10:05:00Z");
        let discarded = record("device-b", "2026-03-01T10:00:00Z");
        let entry =
            ConflictRecord::discarded(SyncTable::Customers, &stored, &discarded, Utc::now());

        repo.append(&entry).await.unwrap();

        let listed = repo.list(10, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record_id, "c1");
        assert_eq!(listed[0].loser_payload["balanceCents"], 100);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_since_filters() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().conflicts();

        let stored = record("device-a", "2026-03-01T10:05:00Z");
        let discarded = record("device-b", "2026-03-01T10:00:00Z");
        let entry =
            ConflictRecord::discarded(SyncTable::Customers, &stored, &discarded, Utc::now());
        repo.append(&entry).await.unwrap();

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(repo.list(10, Some(future)).await.unwrap().is_empty());
    }
}
