//! # Queue Manager
//!
//! Holds records whose dependencies are not yet satisfied and retries them.
//!
//! ## Sweep Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Queue Sweep                                      │
//! │                                                                         │
//! │  process(limit)                                                        │
//! │       │  (async mutex: one sweep in flight at a time)                  │
//! │       ▼                                                                 │
//! │  entries = due(limit)   FIFO by enqueue time                           │
//! │       │                                                                 │
//! │       ▼  for each entry                                                 │
//! │  re-run dependency check                                               │
//! │       │                                                                 │
//! │       ├── Ready ──► conflict-resolving write ──► delete entry          │
//! │       │             (idempotent: a newer stored copy means the          │
//! │       │              record was superseded; the entry still clears)     │
//! │       │                                                                 │
//! │       ├── Missing ──► attempts += 1                                     │
//! │       │               attempts > MAX_QUEUE_ATTEMPTS ──► exhausted       │
//! │       │                                                                 │
//! │       └── MalformedReference ──► exhausted immediately                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use meridian_core::{
    MissingDependency, QueueEntry, SyncRecord, SyncTable, MAX_QUEUE_ATTEMPTS,
};
use meridian_db::QueueRepository;

use crate::conflict::ConflictResolver;
use crate::deps::{DependencyResolver, DependencyStatus};
use crate::error::SyncResult;

// =============================================================================
// Sweep Summary
// =============================================================================

/// Result of one queue sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Entries examined this sweep.
    pub processed: usize,
    /// Entries whose record was applied (or superseded) and removed.
    pub applied: usize,
    /// Entries left queued with an incremented attempt count.
    pub requeued: usize,
    /// Entries that crossed the attempt threshold this sweep.
    pub exhausted: usize,
}

// =============================================================================
// Queue Manager
// =============================================================================

/// Retries dependency-blocked records through the normal write path.
#[derive(Clone)]
pub struct QueueManager {
    queue: QueueRepository,
    resolver: DependencyResolver,
    writer: ConflictResolver,
    /// Serializes sweeps: a sweep must not race with itself.
    sweep_lock: Arc<Mutex<()>>,
}

impl QueueManager {
    /// Creates a queue manager over the given repositories.
    pub fn new(
        queue: QueueRepository,
        resolver: DependencyResolver,
        writer: ConflictResolver,
    ) -> Self {
        QueueManager {
            queue,
            resolver,
            writer,
            sweep_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Queues a record that failed dependency validation.
    pub async fn enqueue(
        &self,
        table: SyncTable,
        record: &SyncRecord,
        missing: Vec<MissingDependency>,
        now: DateTime<Utc>,
    ) -> SyncResult<QueueEntry> {
        let entry = QueueEntry::new(table, record, missing, now);
        self.queue.enqueue(&entry).await?;
        Ok(entry)
    }

    /// Sweeps up to `limit` queued entries, applying those whose
    /// dependencies are now satisfied.
    ///
    /// Sweeps serialize on an internal mutex, so concurrent callers queue
    /// up rather than double-processing entries.
    pub async fn process(&self, limit: u32, now: DateTime<Utc>) -> SyncResult<SweepSummary> {
        let _guard = self.sweep_lock.lock().await;

        let entries = self.queue.due(limit).await?;
        let mut summary = SweepSummary {
            processed: entries.len(),
            ..SweepSummary::default()
        };

        for entry in entries {
            // Payloads were validated at enqueue time; a failure here means
            // the row was tampered with outside the engine.
            let record = match SyncRecord::from_value(entry.payload.clone()) {
                Ok(record) => record,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Dropping corrupt queue entry");
                    self.queue.delete(&entry.id).await?;
                    continue;
                }
            };

            match self.resolver.check_record(entry.table, &record).await? {
                DependencyStatus::Ready => {
                    // Normal write path: conflict resolution still applies.
                    // A Discarded outcome means a newer version arrived while
                    // this one waited; either way the entry is settled.
                    self.writer.apply(entry.table, &record, now).await?;
                    self.queue.delete(&entry.id).await?;
                    summary.applied += 1;
                }
                DependencyStatus::Missing(missing) => {
                    let exhausted = entry.attempts + 1 >= MAX_QUEUE_ATTEMPTS;
                    self.queue
                        .record_attempt(&entry.id, &missing, exhausted, now)
                        .await?;
                    if exhausted {
                        warn!(
                            entry_id = %entry.id,
                            table = %entry.table,
                            record_id = %entry.record_id,
                            attempts = entry.attempts + 1,
                            "Queue entry exhausted retry budget"
                        );
                        summary.exhausted += 1;
                    } else {
                        summary.requeued += 1;
                    }
                }
                DependencyStatus::MalformedReference { field } => {
                    warn!(
                        entry_id = %entry.id,
                        field,
                        "Queue entry references nothing; marking exhausted"
                    );
                    self.queue
                        .record_attempt(&entry.id, &entry.missing, true, now)
                        .await?;
                    summary.exhausted += 1;
                }
            }
        }

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                applied = summary.applied,
                requeued = summary.requeued,
                exhausted = summary.exhausted,
                "Queue sweep complete"
            );
        }

        Ok(summary)
    }

    /// Current queue contents for inspection.
    pub async fn snapshot(&self, limit: u32) -> SyncResult<Vec<QueueEntry>> {
        Ok(self.queue.snapshot(limit).await?)
    }

    /// (live, exhausted) entry counts.
    pub async fn depth(&self) -> SyncResult<(i64, i64)> {
        Ok(self.queue.depth().await?)
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

    fn job(id: &str, customer: &str, ts: &str) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": id,
            "deviceId": "device-a",
            "updatedAt": ts,
            "customerId": customer,
            "serviceTypeId": "svc-1"
        }))
        .unwrap()
    }

    fn leaf(id: &str, ts: &str) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": id,
            "deviceId": "device-b",
            "updatedAt": ts
        }))
        .unwrap()
    }

    async fn setup() -> (Database, QueueManager) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resolver = DependencyResolver::new(db.records());
        let writer = ConflictResolver::new(db.records(), db.conflicts());
        let manager = QueueManager::new(db.queue(), resolver, writer);
        (db, manager)
    }

    /// A job referencing a nonexistent customer stays
    /// queued until the customer exists, then exactly one sweep applies it.
    #[tokio::test]
    async fn test_blocked_record_applies_after_dependency_arrives() {
        let (db, manager) = setup().await;

        // service type exists, customer does not
        db.records()
            .apply_if_newer(SyncTable::ServiceTypes, &leaf("svc-1", "2026-03-01T08:00:00Z"))
            .await
            .unwrap();

        let blocked = job("job-1", "cust-1", "2026-03-01T10:00:00Z");
        manager
            .enqueue(
                SyncTable::Jobs,
                &blocked,
                vec![MissingDependency {
                    table: SyncTable::Customers,
                    id: "cust-1".to_string(),
                }],
                Utc::now(),
            )
            .await
            .unwrap();

        // still blocked: sweep requeues, record not applied
        let summary = manager.process(10, Utc::now()).await.unwrap();
        assert_eq!(summary.requeued, 1);
        assert_eq!(summary.applied, 0);
        assert!(db.records().get(SyncTable::Jobs, "job-1").await.unwrap().is_none());

        // dependency arrives
        db.records()
            .apply_if_newer(SyncTable::Customers, &leaf("cust-1", "2026-03-01T09:00:00Z"))
            .await
            .unwrap();

        // exactly one sweep resolves it
        let summary = manager.process(10, Utc::now()).await.unwrap();
        assert_eq!(summary.applied, 1);
        assert!(db.records().get(SyncTable::Jobs, "job-1").await.unwrap().is_some());
        assert_eq!(manager.depth().await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_entry_exhausts_after_max_attempts() {
        let (_db, manager) = setup().await;

        let blocked = job("job-1", "cust-never", "2026-03-01T10:00:00Z");
        manager
            .enqueue(
                SyncTable::Jobs,
                &blocked,
                vec![MissingDependency {
                    table: SyncTable::Customers,
                    id: "cust-never".to_string(),
                }],
                Utc::now(),
            )
            .await
            .unwrap();

        let mut exhausted_at = None;
        for attempt in 1..=MAX_QUEUE_ATTEMPTS + 1 {
            let summary = manager.process(10, Utc::now()).await.unwrap();
            if summary.exhausted == 1 {
                exhausted_at = Some(attempt);
                break;
            }
        }
        assert_eq!(exhausted_at, Some(MAX_QUEUE_ATTEMPTS));

        // exhausted entries leave the sweep but stay visible
        let summary = manager.process(10, Utc::now()).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert_eq!(manager.depth().await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_superseded_entry_clears_without_overwriting() {
        let (db, manager) = setup().await;

        db.records()
            .apply_if_newer(SyncTable::ServiceTypes, &leaf("svc-1", "2026-03-01T08:00:00Z"))
            .await
            .unwrap();
        db.records()
            .apply_if_newer(SyncTable::Customers, &leaf("cust-1", "2026-03-01T09:00:00Z"))
            .await
            .unwrap();

        // a newer version of the job landed while the old one sat queued
        let newer = job("job-1", "cust-1", "2026-03-01T11:00:00Z");
        db.records().apply_if_newer(SyncTable::Jobs, &newer).await.unwrap();

        let stale = job("job-1", "cust-1", "2026-03-01T10:00:00Z");
        manager
            .enqueue(SyncTable::Jobs, &stale, vec![], Utc::now())
            .await
            .unwrap();

        let summary = manager.process(10, Utc::now()).await.unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(manager.depth().await.unwrap(), (0, 0));

        // stored copy is still the newer version
        let stored = db.records().get(SyncTable::Jobs, "job-1").await.unwrap().unwrap();
        assert_eq!(
            stored.updated_at.to_rfc3339(),
            "2026-03-01T11:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_sweep_is_fifo() {
        let (db, manager) = setup().await;
        db.records()
            .apply_if_newer(SyncTable::ServiceTypes, &leaf("svc-1", "2026-03-01T08:00:00Z"))
            .await
            .unwrap();
        db.records()
            .apply_if_newer(SyncTable::Customers, &leaf("cust-1", "2026-03-01T09:00:00Z"))
            .await
            .unwrap();

        let first = job("job-1", "cust-1", "2026-03-01T10:00:00Z");
        let second = job("job-2", "cust-1", "2026-03-01T10:01:00Z");
        let t0 = Utc::now();
        manager.enqueue(SyncTable::Jobs, &first, vec![], t0).await.unwrap();
        manager
            .enqueue(SyncTable::Jobs, &second, vec![], t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();

        // limit 1 processes the older entry first
        manager.process(1, Utc::now()).await.unwrap();
        assert!(db.records().get(SyncTable::Jobs, "job-1").await.unwrap().is_some());
        assert!(db.records().get(SyncTable::Jobs, "job-2").await.unwrap().is_none());
    }
}
