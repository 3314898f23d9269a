//! # Sync Coordinator
//!
//! Orchestrates per-table and multi-table synchronization passes between a
//! device and the server store, in dependency order.
//!
//! ## Upload Path (per record, never all-or-nothing)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Upload(device, table, records)                  │
//! │                                                                         │
//! │  batch size > cap ──► ValidationError (whole request)                  │
//! │       │                                                                 │
//! │       ▼  per record                                                     │
//! │  metadata valid? ──no──► rejected: malformed (record only)             │
//! │       │yes                                                              │
//! │       ▼                                                                 │
//! │  dependencies satisfied? ──no──► queued + rejected: "queued: ..."      │
//! │       │yes                                                              │
//! │       ▼                                                                 │
//! │  conflict-resolving write                                              │
//! │       ├── applied ──► accepted                                         │
//! │       └── discarded ──► rejected: "conflict: ..." (+ audit entry)      │
//! │                                                                         │
//! │  Response enumerates per-record outcomes so the device marks each      │
//! │  local row SYNCED or FAILED without re-sending the batch.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Download Path
//! Strictly-greater comparison on the `(updated_at, id)` watermark tuple,
//! no self-echo, deterministic ordering, limit+1 probe for `has_more`.
//! Repeating a call with the same cursor can neither skip nor duplicate.
//!
//! Batch forms walk the closed tier list in ascending order regardless of
//! the order tables appear in the request, so a dependent record's
//! prerequisites always commit (or arrive) first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use meridian_core::record::Watermark;
use meridian_core::{
    validate_batch_size, CoreError, SyncRecord, SyncTable, DEFAULT_DOWNLOAD_LIMIT,
    MAX_BATCH_RECORDS, MAX_DOWNLOAD_LIMIT,
};
use meridian_db::Database;

use crate::conflict::{ApplyOutcome, ConflictResolver};
use crate::deps::{DependencyResolver, DependencyStatus};
use crate::error::SyncResult;
use crate::queue::{QueueManager, SweepSummary};

// =============================================================================
// Outcome Types
// =============================================================================

/// One record the server did not accept, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    pub id: String,
    pub reason: String,
}

/// Per-record outcomes of one table upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// Ids the store now holds as the accepted version.
    pub accepted: Vec<String>,
    /// Ids that were not applied, each with a reason the device can act on.
    pub rejected: Vec<RejectedRecord>,
}

/// One page of a table download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPage {
    /// Record payloads, `(updatedAt, id)` ascending.
    pub records: Vec<Value>,
    /// Cursor for the next page. An empty page echoes the caller's own
    /// watermark, so resuming from this value is always safe.
    pub next_cursor: Option<String>,
    /// End-of-data indicator: false means this page drained the table.
    pub has_more: bool,
}

/// Per-table breakdown of a batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadOutcome {
    pub tables: BTreeMap<String, UploadOutcome>,
}

/// Per-table breakdown of a batch download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadOutcome {
    pub tables: BTreeMap<String, DownloadPage>,
}

/// Aggregate sync state for the status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Row count per synchronized table.
    pub tables: BTreeMap<String, i64>,
    /// Live retry-queue entries.
    pub queue_depth: i64,
    /// Exhausted retry-queue entries retained for diagnostics.
    pub queue_exhausted: i64,
    /// Total conflict log entries.
    pub conflicts: i64,
    /// The calling device's stored cursor per table.
    pub cursors: BTreeMap<String, String>,
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Server-side orchestration of upload/download/batch passes.
///
/// Stateless per call except for the durable store and queue: transient
/// transport failures are the caller's to retry.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    resolver: DependencyResolver,
    writer: ConflictResolver,
    queue: QueueManager,
}

impl SyncCoordinator {
    /// Builds a coordinator (and its queue manager) over a database.
    pub fn new(db: Database) -> Self {
        let resolver = DependencyResolver::new(db.records());
        let writer = ConflictResolver::new(db.records(), db.conflicts());
        let queue = QueueManager::new(db.queue(), resolver.clone(), writer.clone());

        SyncCoordinator {
            db,
            resolver,
            writer,
            queue,
        }
    }

    /// The queue manager backing this coordinator.
    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    /// The dependency resolver backing this coordinator.
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Applies a batch of records to one table, reporting per-record
    /// outcomes. A failing record never aborts its siblings.
    pub async fn upload(
        &self,
        device_id: &str,
        table: SyncTable,
        records: Vec<Value>,
    ) -> SyncResult<UploadOutcome> {
        validate_batch_size(records.len(), MAX_BATCH_RECORDS)?;

        let now = Utc::now();
        let mut outcome = UploadOutcome::default();

        for value in records {
            let record = match SyncRecord::from_value(value) {
                Ok(record) => record,
                Err(CoreError::MalformedRecord { id, reason }) => {
                    outcome.rejected.push(RejectedRecord {
                        id: if id.is_empty() { "unknown".to_string() } else { id },
                        reason: format!("malformed: {reason}"),
                    });
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            match self.resolver.check_record(table, &record).await? {
                DependencyStatus::Ready => {
                    match self.writer.apply(table, &record, now).await? {
                        ApplyOutcome::Applied => outcome.accepted.push(record.id),
                        ApplyOutcome::Discarded => outcome.rejected.push(RejectedRecord {
                            id: record.id,
                            reason: "conflict: a newer or equal version is already stored"
                                .to_string(),
                        }),
                    }
                }
                DependencyStatus::Missing(missing) => {
                    let entry = self.queue.enqueue(table, &record, missing, now).await?;
                    outcome.rejected.push(RejectedRecord {
                        id: record.id,
                        reason: entry.rejection_reason(),
                    });
                }
                DependencyStatus::MalformedReference { field } => {
                    outcome.rejected.push(RejectedRecord {
                        id: record.id,
                        reason: format!("malformed: reference field '{field}' is missing or null"),
                    });
                }
            }
        }

        info!(
            device_id = %device_id,
            table = %table,
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Upload processed"
        );

        Ok(outcome)
    }

    // =========================================================================
    // Download
    // =========================================================================

    /// Returns records strictly newer than the caller's watermark,
    /// excluding the caller's own records, in deterministic order.
    ///
    /// `cursor` wins over `since` when both are given: the cursor carries
    /// the id tiebreaker, `since` alone starts at the bare timestamp.
    /// A passed cursor also advances the device's durable cursor row; the
    /// device only sends a cursor covering records it has durably applied.
    pub async fn download(
        &self,
        device_id: &str,
        table: SyncTable,
        since: Option<DateTime<Utc>>,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> SyncResult<DownloadPage> {
        let mark = match cursor {
            Some(token) => {
                let mark = Watermark::parse(token)?;
                self.db
                    .cursors()
                    .advance(device_id, table, &mark, Utc::now())
                    .await?;
                mark
            }
            None => since.map(Watermark::since).unwrap_or_else(Watermark::origin),
        };

        self.page(device_id, table, &mark, limit).await
    }

    /// Fetches one page after `mark`.
    async fn page(
        &self,
        device_id: &str,
        table: SyncTable,
        mark: &Watermark,
        limit: Option<u32>,
    ) -> SyncResult<DownloadPage> {
        let limit = limit.unwrap_or(DEFAULT_DOWNLOAD_LIMIT).clamp(1, MAX_DOWNLOAD_LIMIT);

        // Probe one past the limit to learn whether more data remains.
        let mut records = self
            .db
            .records()
            .fetch_since(table, mark, device_id, limit + 1)
            .await?;

        let has_more = records.len() as u32 > limit;
        records.truncate(limit as usize);

        // An empty page echoes the request watermark, so the caller can
        // always resume from `nextCursor`; `hasMore` is the end indicator.
        let next_cursor = Some(match records.last() {
            Some(last) => Watermark {
                updated_at: last.updated_at,
                id: last.id.clone(),
            }
            .encode(),
            None => mark.encode(),
        });

        debug!(
            device_id = %device_id,
            table = %table,
            count = records.len(),
            has_more,
            "Download page served"
        );

        Ok(DownloadPage {
            records: records.into_iter().map(|r| r.payload).collect(),
            next_cursor,
            has_more,
        })
    }

    // =========================================================================
    // Batch
    // =========================================================================

    /// Uploads multiple tables in one pass, strictly in ascending tier
    /// order regardless of their order in the request body. An undeclared
    /// table name rejects the whole request with `InvalidTable` before
    /// anything is applied.
    pub async fn batch_upload(
        &self,
        device_id: &str,
        tables: BTreeMap<String, Vec<Value>>,
    ) -> SyncResult<BatchUploadOutcome> {
        let mut parsed: BTreeMap<SyncTable, Vec<Value>> = BTreeMap::new();
        for (name, records) in tables {
            parsed.insert(name.parse::<SyncTable>()?, records);
        }

        let mut outcome = BatchUploadOutcome::default();
        for table in SyncTable::in_tier_order() {
            if let Some(records) = parsed.remove(&table) {
                let table_outcome = self.upload(device_id, table, records).await?;
                outcome.tables.insert(table.as_str().to_string(), table_outcome);
            }
        }

        Ok(outcome)
    }

    /// Downloads multiple tables in one pass, in ascending tier order so a
    /// dependent record never arrives before the table it validates
    /// against. Per-table start point: `since` if given, else the device's
    /// stored cursor, else the origin.
    pub async fn batch_download(
        &self,
        device_id: &str,
        tables: &[String],
        since: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> SyncResult<BatchDownloadOutcome> {
        let mut requested = Vec::with_capacity(tables.len());
        for name in tables {
            requested.push(name.parse::<SyncTable>()?);
        }

        let mut outcome = BatchDownloadOutcome::default();
        for table in SyncTable::in_tier_order() {
            if !requested.contains(&table) {
                continue;
            }

            let mark = match since {
                Some(since) => Watermark::since(since),
                None => self
                    .db
                    .cursors()
                    .get(device_id, table)
                    .await?
                    .unwrap_or_else(Watermark::origin),
            };

            let page = self.page(device_id, table, &mark, limit).await?;
            outcome.tables.insert(table.as_str().to_string(), page);
        }

        Ok(outcome)
    }

    // =========================================================================
    // Queue & Status
    // =========================================================================

    /// Runs one queue sweep of up to `limit` entries.
    pub async fn process_queue(&self, limit: u32) -> SyncResult<SweepSummary> {
        self.queue.process(limit, Utc::now()).await
    }

    /// Aggregate sync state for a device.
    pub async fn status(&self, device_id: &str) -> SyncResult<StatusReport> {
        let mut report = StatusReport::default();

        for table in SyncTable::in_tier_order() {
            report
                .tables
                .insert(table.as_str().to_string(), self.db.records().count(table).await?);
        }

        let (live, exhausted) = self.queue.depth().await?;
        report.queue_depth = live;
        report.queue_exhausted = exhausted;
        report.conflicts = self.db.conflicts().count().await?;

        for (table, mark) in self.db.cursors().list_for_device(device_id).await? {
            report.cursors.insert(table.as_str().to_string(), mark.encode());
        }

        Ok(report)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
