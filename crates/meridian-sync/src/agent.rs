//! # Sync Agent
//!
//! The device-side sync loop: uploads pending local rows, downloads other
//! devices' changes, validates dependencies on arrival, and sweeps the
//! local retry queue.
//!
//! ## One Sync Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncAgent pass                                  │
//! │                                                                         │
//! │  1. UPLOAD (tier order)                                                │
//! │     collect PENDING rows per table ──► POST /sync/batch-upload         │
//! │     accepted ids ──► mark SYNCED                                       │
//! │     rejected ids ──► mark FAILED (reason logged, CRUD never blocked)   │
//! │                                                                         │
//! │  2. DOWNLOAD (tier order, per table)                                   │
//! │     page from durable local cursor ──► GET /sync/download              │
//! │     per record: dependency check against the LOCAL store              │
//! │        ready   ──► conflict-resolving local apply                      │
//! │        missing ──► local retry queue                                   │
//! │     after the page is durably applied ──► advance local cursor        │
//! │     repeat while hasMore                                               │
//! │                                                                         │
//! │  3. QUEUE SWEEP                                                        │
//! │     one processQueue pass over the local queue                         │
//! │                                                                         │
//! │  Transient HTTP failures retry with exponential backoff; domain        │
//! │  rejections never retry (the input wouldn't change).                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use backoff::ExponentialBackoff;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use meridian_core::record::Watermark;
use meridian_core::{SyncRecord, SyncStatus, SyncTable};
use meridian_db::Database;

use crate::client::SyncClient;
use crate::conflict::ConflictResolver;
use crate::deps::{DependencyResolver, DependencyStatus};
use crate::error::{SyncError, SyncResult};
use crate::queue::{QueueManager, SweepSummary};

// =============================================================================
// Configuration
// =============================================================================

/// Device-side sync settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the sync server, e.g. `http://hub.local:8600`.
    pub server_url: String,

    /// This installation's stable device id.
    pub device_id: String,

    /// Pending rows uploaded per table per pass.
    pub upload_batch_size: u32,

    /// Records requested per download page.
    pub download_limit: u32,

    /// Queue entries retried per sweep.
    pub queue_sweep_limit: u32,

    /// Seconds between automatic passes.
    pub poll_interval_secs: u64,

    /// Bound on any single HTTP request.
    pub request_timeout_secs: u64,
}

impl AgentConfig {
    /// Config with production defaults for the given server and device.
    pub fn new(server_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        AgentConfig {
            server_url: server_url.into(),
            device_id: device_id.into(),
            upload_batch_size: 100,
            download_limit: 200,
            queue_sweep_limit: 50,
            poll_interval_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

/// What one pass accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Rows marked SYNCED this pass.
    pub uploaded: usize,
    /// Rows marked FAILED this pass.
    pub failed: usize,
    /// Records applied from downloads.
    pub downloaded: usize,
    /// Records parked in the local retry queue.
    pub queued: usize,
    /// Local queue sweep outcome.
    pub sweep: SweepSummary,
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Background sync driver for one device.
pub struct SyncAgent {
    db: Database,
    client: SyncClient,
    config: AgentConfig,
    resolver: DependencyResolver,
    writer: ConflictResolver,
    queue: QueueManager,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling a running agent.
#[derive(Clone)]
pub struct AgentHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl AgentHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Agent shutdown channel closed".into()))
    }
}

impl SyncAgent {
    /// Creates an agent and its control handle.
    pub fn new(db: Database, config: AgentConfig) -> SyncResult<(Self, AgentHandle)> {
        let client = SyncClient::new(
            &config.server_url,
            &config.device_id,
            Duration::from_secs(config.request_timeout_secs),
        )?;

        let resolver = DependencyResolver::new(db.records());
        let writer = ConflictResolver::new(db.records(), db.conflicts());
        let queue = QueueManager::new(db.queue(), resolver.clone(), writer.clone());

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let agent = SyncAgent {
            db,
            client,
            config,
            resolver,
            writer,
            queue,
            shutdown_rx,
        };

        Ok((agent, AgentHandle { shutdown_tx }))
    }

    /// Runs the periodic sync loop until shutdown.
    ///
    /// This should be spawned as a background task. A failed pass is logged
    /// and retried on the next tick; it never takes the loop down.
    pub async fn run(mut self) {
        info!(device_id = %self.config.device_id, "Sync agent starting");

        // First pass after one full interval, not immediately: startup is
        // when the local store is busiest.
        let period = Duration::from_secs(self.config.poll_interval_secs);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sync_once().await {
                        Ok(report) => {
                            debug!(?report, "Sync pass complete");
                        }
                        Err(e) => {
                            error!(error = %e, "Sync pass failed");
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync agent shutting down");
                    break;
                }
            }
        }

        info!("Sync agent stopped");
    }

    /// One full upload → download → sweep pass.
    pub async fn sync_once(&self) -> SyncResult<PassReport> {
        let mut report = PassReport::default();

        self.upload_pass(&mut report).await?;
        self.download_pass(&mut report).await?;
        report.sweep = self.queue.process(self.config.queue_sweep_limit, Utc::now()).await?;

        Ok(report)
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Collects PENDING rows per table (tier order) and uploads them in one
    /// batch call, then marks each row from its per-record outcome.
    async fn upload_pass(&self, report: &mut PassReport) -> SyncResult<()> {
        let records = self.db.records();

        let mut tables: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for table in SyncTable::in_tier_order() {
            let pending = records
                .list_by_status(table, SyncStatus::Pending, self.config.upload_batch_size)
                .await?;
            if !pending.is_empty() {
                tables.insert(
                    table.as_str().to_string(),
                    pending.into_iter().map(|r| r.payload).collect(),
                );
            }
        }

        if tables.is_empty() {
            return Ok(());
        }

        let response = self
            .with_backoff(|| self.client.batch_upload(&tables))
            .await?;

        for (name, outcome) in response.outcome.tables {
            let table: SyncTable = name
                .parse()
                .map_err(|_| SyncError::InvalidResponse(format!("unknown table '{name}'")))?;

            if !outcome.accepted.is_empty() {
                records
                    .mark_status(table, &outcome.accepted, SyncStatus::Synced)
                    .await?;
                report.uploaded += outcome.accepted.len();
            }

            if !outcome.rejected.is_empty() {
                let failed_ids: Vec<String> =
                    outcome.rejected.iter().map(|r| r.id.clone()).collect();
                for rejected in &outcome.rejected {
                    warn!(
                        table = %table,
                        record_id = %rejected.id,
                        reason = %rejected.reason,
                        "Server rejected record"
                    );
                }
                records
                    .mark_status(table, &failed_ids, SyncStatus::Failed)
                    .await?;
                report.failed += failed_ids.len();
            }
        }

        Ok(())
    }

    // =========================================================================
    // Download
    // =========================================================================

    /// Pages each table from its durable local cursor, applying or queueing
    /// incoming records, advancing the cursor only after a page is applied.
    async fn download_pass(&self, report: &mut PassReport) -> SyncResult<()> {
        for table in SyncTable::in_tier_order() {
            loop {
                let cursor = self
                    .db
                    .cursors()
                    .get(&self.config.device_id, table)
                    .await?
                    .map(|m| m.encode());

                let response = self
                    .with_backoff(|| {
                        self.client
                            .download(table, cursor.as_deref(), self.config.download_limit)
                    })
                    .await?;

                if response.page.records.is_empty() {
                    break;
                }

                for value in response.page.records {
                    self.apply_incoming(table, value, report).await?;
                }

                // The page is durably applied; only now may the cursor move.
                if let Some(next) = &response.page.next_cursor {
                    let mark = Watermark::parse(next)?;
                    self.db
                        .cursors()
                        .advance(&self.config.device_id, table, &mark, Utc::now())
                        .await?;
                }

                if !response.page.has_more {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Routes one downloaded record: apply if its dependencies are locally
    /// satisfied, queue otherwise.
    async fn apply_incoming(
        &self,
        table: SyncTable,
        value: Value,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let record = match SyncRecord::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                // Defect upstream; skipping keeps the page moving.
                warn!(table = %table, error = %e, "Skipping malformed downloaded record");
                return Ok(());
            }
        };

        match self.resolver.check_record(table, &record).await? {
            DependencyStatus::Ready => {
                self.writer.apply(table, &record, Utc::now()).await?;
                report.downloaded += 1;
            }
            DependencyStatus::Missing(missing) => {
                self.queue.enqueue(table, &record, missing, Utc::now()).await?;
                report.queued += 1;
            }
            DependencyStatus::MalformedReference { field } => {
                warn!(
                    table = %table,
                    record_id = %record.id,
                    field,
                    "Downloaded record has a null reference; skipping"
                );
            }
        }

        Ok(())
    }

    // =========================================================================
    // Retry
    // =========================================================================

    /// Retries a transport call with exponential backoff; domain failures
    /// (4xx, validation) surface immediately.
    async fn with_backoff<T, F, Fut>(&self, op: F) -> SyncResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SyncResult<T>>,
    {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            op().await.map_err(|e| {
                if e.is_retryable() {
                    warn!(error = %e, "Transient sync failure; backing off");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_db::DbConfig;

    #[test]
    fn test_config_defaults_are_bounded() {
        let config = AgentConfig::new("http://localhost:8600", "device-a");
        assert!(config.upload_batch_size as usize <= meridian_core::MAX_BATCH_RECORDS);
        assert!(config.download_limit <= meridian_core::MAX_DOWNLOAD_LIMIT);
        assert!(config.request_timeout_secs > 0);
    }

    #[tokio::test]
    async fn test_agent_constructs_and_shuts_down() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (agent, handle) =
            SyncAgent::new(db, AgentConfig::new("http://localhost:8600", "device-a")).unwrap();

        let task = tokio::spawn(agent.run());
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
