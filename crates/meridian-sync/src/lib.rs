//! # meridian-sync: Sync Engine for Meridian POS
//!
//! Every synchronization decision lives in this crate: which dependencies a
//! record needs, which version of a record wins, when a blocked record
//! retries, how a device and the server exchange pages of changes, and how
//! clock skew is surfaced before it corrupts conflict ordering.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Multi-Device Synchronization                          │
//! │                                                                         │
//! │  DEVICE (SyncAgent)                     SERVER (SyncCoordinator)       │
//! │  ─────────────────                      ────────────────────────       │
//! │  local CRUD ──► rows PENDING                                           │
//! │       │                                                                 │
//! │       ▼          batch-upload (tier order)                             │
//! │  SyncClient ───────────────────────────► ConflictResolver merges       │
//! │       │                                       │                         │
//! │       │          per-record outcomes          ▼                         │
//! │       ◄─────────────────────────────── accepted / rejected             │
//! │  mark SYNCED / FAILED                   (blocked ──► QueueManager)     │
//! │       │                                                                 │
//! │       │          download since cursor (tier order)                    │
//! │  SyncClient ───────────────────────────► watermark page, no self-echo  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DependencyResolver checks arrivals                                    │
//! │   ready ──► local apply    missing ──► local QueueManager              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  advance durable cursor, sweep queue                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`deps`] - Dependency Resolver (foreign-key existence checks)
//! - [`conflict`] - Conflict Resolver application (last-write-wins + audit)
//! - [`queue`] - Queue Manager (FIFO retry sweep)
//! - [`coordinator`] - Sync Coordinator (upload/download/batch, server side)
//! - [`skew`] - Clock Skew Guard
//! - [`client`] - Device-side HTTP client
//! - [`agent`] - Device-side background sync loop
//! - [`error`] - Engine error types

pub mod agent;
pub mod client;
pub mod conflict;
pub mod coordinator;
pub mod deps;
pub mod error;
pub mod queue;
pub mod skew;

pub use agent::{AgentConfig, AgentHandle, PassReport, SyncAgent};
pub use client::SyncClient;
pub use conflict::{ApplyOutcome, ConflictResolver};
pub use coordinator::{
    BatchDownloadOutcome, BatchUploadOutcome, DownloadPage, RejectedRecord, StatusReport,
    SyncCoordinator, UploadOutcome,
};
pub use deps::{DependencyReport, DependencyResolver, DependencyStatus};
pub use error::{SyncError, SyncResult};
pub use queue::{QueueManager, SweepSummary};
pub use skew::{ClockSkewGuard, SkewWarning, CLOCK_SKEW_THRESHOLD_SECS};
