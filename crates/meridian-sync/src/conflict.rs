//! # Conflict Resolver (application)
//!
//! Executes the pure last-write-wins decision from `meridian_core::conflict`
//! against the record store, logging discarded versions.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Conflict-Resolving Write                             │
//! │                                                                         │
//! │  incoming record                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  read stored copy ──► ConflictDecision::decide (pure)                  │
//! │       │                                                                 │
//! │       ├── Insert/Overwrite ──► apply_if_newer (guarded upsert)         │
//! │       │         │                                                       │
//! │       │         ├── applied ──► Applied (nothing logged)               │
//! │       │         └── lost race ──► re-read, log conflict, Discarded     │
//! │       │                                                                 │
//! │       └── Discard ──► append ConflictRecord ──► Discarded              │
//! │                                                                         │
//! │  The guarded upsert is the atomic arbiter; the pre-read only decides   │
//! │  whether a conflict entry is owed. Outcome is identical regardless     │
//! │  of arrival order.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use meridian_core::{ConflictDecision, ConflictRecord, SyncRecord, SyncTable};
use meridian_db::{ConflictRepository, RecordRepository};

use crate::error::SyncResult;

// =============================================================================
// Apply Outcome
// =============================================================================

/// Result of pushing one record version through the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The incoming version is now the stored version.
    Applied,
    /// The incoming version lost to a newer or equal stored version and was
    /// discarded; a conflict entry was appended.
    Discarded,
}

impl ApplyOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

// =============================================================================
// Conflict Resolver
// =============================================================================

/// Applies record versions under last-write-wins.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    records: RecordRepository,
    conflicts: ConflictRepository,
}

impl ConflictResolver {
    /// Creates a resolver over the given store and conflict log.
    pub fn new(records: RecordRepository, conflicts: ConflictRepository) -> Self {
        ConflictResolver { records, conflicts }
    }

    /// Applies `incoming` if it wins against the stored copy.
    ///
    /// Winning versions are not logged; losing versions append a
    /// [`ConflictRecord`] before reporting [`ApplyOutcome::Discarded`].
    pub async fn apply(
        &self,
        table: SyncTable,
        incoming: &SyncRecord,
        now: DateTime<Utc>,
    ) -> SyncResult<ApplyOutcome> {
        let stored = self.records.get(table, &incoming.id).await?;

        match ConflictDecision::decide(incoming, stored.as_ref()) {
            ConflictDecision::Insert | ConflictDecision::Overwrite => {
                if self.records.apply_if_newer(table, incoming).await? {
                    debug!(table = %table, record_id = %incoming.id, "Record version applied");
                    return Ok(ApplyOutcome::Applied);
                }

                // A concurrent write won the guarded upsert between our read
                // and our write. Re-read the survivor to log the loss.
                let survivor = self.records.get(table, &incoming.id).await?;
                self.log_discard(table, survivor.as_ref(), incoming, now).await?;
                Ok(ApplyOutcome::Discarded)
            }
            ConflictDecision::Discard => {
                self.log_discard(table, stored.as_ref(), incoming, now).await?;
                Ok(ApplyOutcome::Discarded)
            }
        }
    }

    async fn log_discard(
        &self,
        table: SyncTable,
        survivor: Option<&SyncRecord>,
        discarded: &SyncRecord,
        now: DateTime<Utc>,
    ) -> SyncResult<()> {
        // Discard implies a stored copy exists; a vanished survivor would
        // mean an external delete raced us, in which case there is nothing
        // meaningful to log.
        if let Some(survivor) = survivor {
            let entry = ConflictRecord::discarded(table, survivor, discarded, now);
            self.conflicts.append(&entry).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_db::{Database, DbConfig};
    use serde_json::json;

    fn record(device: &str, ts: &str, balance: i64) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": "c1",
            "deviceId": device,
            "updatedAt": ts,
            "balanceCents": balance
        }))
        .unwrap()
    }

    async fn setup() -> (Database, ConflictResolver) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resolver = ConflictResolver::new(db.records(), db.conflicts());
        (db, resolver)
    }

    #[tokio::test]
    async fn test_insert_without_conflict_is_not_logged() {
        let (db, resolver) = setup().await;
        let outcome = resolver
            .apply(
                SyncTable::Customers,
                &record("device-a", "2026-03-01T10:00:00Z", 0),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(db.conflicts().count().await.unwrap(), 0);
    }

    /// Two-device scenario: A uploads balance 0 at T1, B uploads
    /// balance 500 at T2 > T1. The final state is 500 and the newer write
    /// logs no conflict.
    #[tokio::test]
    async fn test_newer_write_wins_silently() {
        let (db, resolver) = setup().await;
        let t1 = record("device-a", "2026-03-01T10:00:00Z", 0);
        let t2 = record("device-b", "2026-03-01T10:05:00Z", 500);

        assert!(resolver
            .apply(SyncTable::Customers, &t1, Utc::now())
            .await
            .unwrap()
            .applied());
        assert!(resolver
            .apply(SyncTable::Customers, &t2, Utc::now())
            .await
            .unwrap()
            .applied());

        let stored = db.records().get(SyncTable::Customers, "c1").await.unwrap().unwrap();
        assert_eq!(stored.payload["balanceCents"], 500);
        assert_eq!(stored.device_id, "device-b");
        assert_eq!(db.conflicts().count().await.unwrap(), 0);
    }

    /// Same scenario with T2 < T1: B's write is discarded and a conflict
    /// entry IS created, holding B's losing payload.
    #[tokio::test]
    async fn test_stale_write_is_discarded_and_logged() {
        let (db, resolver) = setup().await;
        let t1 = record("device-a", "2026-03-01T10:05:00Z", 0);
        let stale = record("device-b", "2026-03-01T10:00:00Z", 500);

        resolver.apply(SyncTable::Customers, &t1, Utc::now()).await.unwrap();
        let outcome = resolver
            .apply(SyncTable::Customers, &stale, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Discarded);

        let stored = db.records().get(SyncTable::Customers, "c1").await.unwrap().unwrap();
        assert_eq!(stored.payload["balanceCents"], 0);

        let log = db.conflicts().list(10, None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].loser_device_id, "device-b");
        assert_eq!(log[0].loser_payload["balanceCents"], 500);
    }

    /// Applying the same two versions in the opposite order converges on
    /// the same final state (commutativity at the store level).
    #[tokio::test]
    async fn test_application_order_does_not_matter() {
        let older = record("device-a", "2026-03-01T10:00:00Z", 0);
        let newer = record("device-b", "2026-03-01T10:05:00Z", 500);

        for order in [[&older, &newer], [&newer, &older]] {
            let (db, resolver) = setup().await;
            for version in order {
                resolver
                    .apply(SyncTable::Customers, version, Utc::now())
                    .await
                    .unwrap();
            }
            let stored = db.records().get(SyncTable::Customers, "c1").await.unwrap().unwrap();
            assert_eq!(stored.payload["balanceCents"], 500);
        }
    }

    #[tokio::test]
    async fn test_equal_timestamps_keep_first_arrival() {
        let (db, resolver) = setup().await;
        let first = record("device-a", "2026-03-01T10:00:00Z", 0);
        let second = record("device-b", "2026-03-01T10:00:00Z", 500);

        resolver.apply(SyncTable::Customers, &first, Utc::now()).await.unwrap();
        let outcome = resolver
            .apply(SyncTable::Customers, &second, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Discarded);
        let stored = db.records().get(SyncTable::Customers, "c1").await.unwrap().unwrap();
        assert_eq!(stored.device_id, "device-a");
        assert_eq!(db.conflicts().count().await.unwrap(), 1);
    }
}
