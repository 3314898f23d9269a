//! # Error Types
//!
//! Domain error types for meridian-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                      │
//! │  └── CoreError        - Table, record and batch validation failures    │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  meridian-sync errors (engine crate)                                   │
//! │  └── SyncError        - Coordinator/queue/transport failures           │
//! │                                                                         │
//! │  sync-api errors (app)                                                 │
//! │  └── ApiError         - What goes on the wire (envelope)               │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → ApiError → HTTP envelope                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (table name, record id)
//! 3. Errors are enum variants, never String
//! 4. Errors convert to the wire envelope only at the transport boundary

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Sync domain errors.
///
/// These represent violations of the sync data model: unknown tables,
/// records missing required metadata, oversized batches. They are
/// per-record or per-request failures, never process-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Table name is not part of the tier configuration.
    ///
    /// ## When This Occurs
    /// - A request names a table this engine does not synchronize
    /// - A batch payload contains a table key with a typo
    #[error("Unknown sync table: {0}")]
    InvalidTable(String),

    /// Record is missing required sync metadata or carries unparsable values.
    ///
    /// Rejecting beats guessing: a record without a trustworthy `updatedAt`
    /// cannot participate in last-write-wins resolution.
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },

    /// Upload batch exceeds the configured cap.
    #[error("Batch of {len} records exceeds maximum of {max}")]
    BatchTooLarge { len: usize, max: usize },

    /// A required request field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A numeric request parameter is out of its allowed range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// A cursor token could not be parsed.
    #[error("Invalid sync cursor: {0}")]
    InvalidCursor(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidTable("widgets".to_string());
        assert_eq!(err.to_string(), "Unknown sync table: widgets");

        let err = CoreError::MalformedRecord {
            id: "rec-1".to_string(),
            reason: "missing updatedAt".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed record rec-1: missing updatedAt");
    }

    #[test]
    fn test_batch_too_large_message() {
        let err = CoreError::BatchTooLarge { len: 750, max: 500 };
        assert_eq!(
            err.to_string(),
            "Batch of 750 records exceeds maximum of 500"
        );
    }
}
