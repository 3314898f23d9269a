//! # meridian-core: Pure Sync Types & Policy for Meridian POS
//!
//! This crate is the **heart** of the sync engine. Every decision the engine
//! makes (which table depends on which, which record version wins, what a
//! well-formed record looks like) lives here as pure functions with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Meridian POS Sync Architecture                      │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   apps/sync-api (HTTP+JSON)                     │   │
//! │  │    /sync/upload ── /sync/download ── /sync/queue ── /deps/...  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  meridian-sync (engine)                         │   │
//! │  │    coordinator ── deps ── queue ── conflict ── skew ── agent   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ meridian-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   table   │  │  record   │  │ conflict  │  │   queue   │  │   │
//! │  │   │ SyncTable │  │SyncRecord │  │ decision  │  │QueueEntry │  │   │
//! │  │   │   tiers   │  │ SyncStatus│  │  policy   │  │  invariants│ │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 meridian-db (SQLite layer)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`table`] - Closed table enumeration with tiers and dependency edges
//! - [`record`] - Sync record metadata and lifecycle status
//! - [`conflict`] - Last-write-wins conflict decision and audit record
//! - [`queue`] - Retry queue entry types and invariants
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output, always
//! 2. **No I/O**: database, network, clock reads are FORBIDDEN here
//! 3. **Closed Tables**: table names are an enum, never free strings
//! 4. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod conflict;
pub mod error;
pub mod queue;
pub mod record;
pub mod table;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use meridian_core::SyncTable` instead of
// `use meridian_core::table::SyncTable`

pub use conflict::{ConflictDecision, ConflictRecord};
pub use error::{CoreError, CoreResult};
pub use queue::{MissingDependency, QueueEntry};
pub use record::{validate_batch_size, SyncRecord, SyncStatus, Watermark};
pub use table::{DependencyEdge, SyncTable};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of records accepted in a single upload batch.
///
/// ## Why a cap?
/// Bounds request size and per-call lock duration on the server. Devices
/// with more pending records page through multiple uploads.
pub const MAX_BATCH_RECORDS: usize = 500;

/// Maximum retry attempts for a queued record before it is marked exhausted.
///
/// ## Why 10?
/// A missing dependency normally arrives within one or two sync passes.
/// Ten sweeps without it means the dependency is lost or was never uploaded;
/// the entry is retained for diagnostics instead of retrying forever.
pub const MAX_QUEUE_ATTEMPTS: i64 = 10;

/// Maximum records returned by a single download page.
pub const MAX_DOWNLOAD_LIMIT: u32 = 1000;

/// Default download page size when the caller does not pass a limit.
pub const DEFAULT_DOWNLOAD_LIMIT: u32 = 100;
