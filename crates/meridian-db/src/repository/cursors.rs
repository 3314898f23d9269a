//! # Sync Cursor Repository
//!
//! Durable per-device, per-table download watermarks.
//!
//! Cursors are rows, not process state: a server restart resumes every
//! device exactly where its last durably-applied page ended. Advancement is
//! guarded in SQL so a stale or replayed report can never move a cursor
//! backwards.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use meridian_core::record::Watermark;
use meridian_core::SyncTable;

/// A raw sync_cursors row.
#[derive(Debug, sqlx::FromRow)]
struct CursorRow {
    table_name: String,
    updated_at_ms: i64,
    record_id: String,
}

/// Repository for sync cursor operations.
#[derive(Debug, Clone)]
pub struct CursorRepository {
    pool: SqlitePool,
}

impl CursorRepository {
    /// Creates a new CursorRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CursorRepository { pool }
    }

    /// The device's current watermark for a table, if it has ever synced it.
    pub async fn get(&self, device_id: &str, table: SyncTable) -> DbResult<Option<Watermark>> {
        let row: Option<CursorRow> = sqlx::query_as(
            "SELECT table_name, updated_at_ms, record_id FROM sync_cursors \
             WHERE device_id = ?1 AND table_name = ?2",
        )
        .bind(device_id)
        .bind(table.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let updated_at = DateTime::from_timestamp_millis(r.updated_at_ms)
                .ok_or_else(|| DbError::corrupt("sync_cursors", "timestamp out of range"))?;
            Ok(Watermark {
                updated_at,
                id: r.record_id,
            })
        })
        .transpose()
    }

    /// Advances the cursor, monotonically only.
    ///
    /// The guard compares the full `(updated_at, id)` tuple; an equal or
    /// older mark is a no-op, so replays and out-of-order reports are safe.
    pub async fn advance(
        &self,
        device_id: &str,
        table: SyncTable,
        mark: &Watermark,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sync_cursors (device_id, table_name, updated_at_ms, record_id, advanced_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(device_id, table_name) DO UPDATE SET \
                 updated_at_ms = excluded.updated_at_ms, \
                 record_id = excluded.record_id, \
                 advanced_at_ms = excluded.advanced_at_ms \
             WHERE excluded.updated_at_ms > sync_cursors.updated_at_ms \
                OR (excluded.updated_at_ms = sync_cursors.updated_at_ms \
                    AND excluded.record_id > sync_cursors.record_id)",
        )
        .bind(device_id)
        .bind(table.as_str())
        .bind(mark.updated_at_ms())
        .bind(&mark.id)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All cursors held by a device, keyed by table.
    pub async fn list_for_device(
        &self,
        device_id: &str,
    ) -> DbResult<Vec<(SyncTable, Watermark)>> {
        let rows: Vec<CursorRow> = sqlx::query_as(
            "SELECT table_name, updated_at_ms, record_id FROM sync_cursors \
             WHERE device_id = ?1 ORDER BY table_name",
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let table: SyncTable = r.table_name.parse().map_err(|_| {
                    DbError::corrupt("sync_cursors", format!("table '{}'", r.table_name))
                })?;
                let updated_at = DateTime::from_timestamp_millis(r.updated_at_ms)
                    .ok_or_else(|| DbError::corrupt("sync_cursors", "timestamp out of range"))?;
                Ok((
                    table,
                    Watermark {
                        updated_at,
                        id: r.record_id,
                    },
                ))
            })
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
