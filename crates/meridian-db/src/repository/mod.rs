//! Repository implementations for the sync schema.
//!
//! - [`records`] - the synchronized domain tables
//! - [`queue`] - retry queue for dependency-blocked records
//! - [`cursors`] - per-device download watermarks
//! - [`conflicts`] - append-only conflict audit log

pub mod conflicts;
pub mod cursors;
pub mod queue;
pub mod records;

pub use conflicts::ConflictRepository;
pub use cursors::CursorRepository;
pub use queue::QueueRepository;
pub use records::RecordRepository;
