//! # meridian-db: Database Layer for Meridian POS Sync
//!
//! All database operations live here: the per-device record store, the
//! dependency retry queue, download cursors, and the conflict audit log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          meridian-db                                    │
//! │                                                                         │
//! │  ✅ RESPONSIBILITIES                   ❌ NOT RESPONSIBLE FOR           │
//! │  ──────────────────────                ─────────────────────────        │
//! │  • Connection pool management          • Conflict policy (core)         │
//! │  • SQL query execution                 • Sync orchestration (engine)    │
//! │  • Schema migrations                   • HTTP transport (sync-api)      │
//! │  • Repository implementations                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees the engine leans on
//! - `RecordRepository::apply_if_newer` is a single guarded statement, so
//!   same-record writes serialize inside SQLite (storage-layer CAS).
//! - `CursorRepository::advance` is monotonic; replays cannot rewind.
//! - WAL mode: download scans see a consistent snapshot during uploads.

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::{ConflictRepository, CursorRepository, QueueRepository, RecordRepository};
