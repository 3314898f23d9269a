//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │    Database     │  │      Transport          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidTable   │  │  Database(..)   │  │  RequestFailed          │ │
//! │  │  Malformed..    │  │                 │  │  Timeout                │ │
//! │  │  BatchTooLarge  │  │                 │  │  ServerRejected         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Domain errors are per-request/per-record and never retried;           │
//! │  transport errors are transient and retried by the caller with        │
//! │  backoff. is_retryable() draws the line.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use meridian_core::CoreError;
use meridian_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Table/record/batch validation failure from the core policy layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A referenced entity is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Transport Errors (device-side client)
    // =========================================================================
    /// HTTP request could not be completed.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Request exceeded its bounded timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Server answered with a failure envelope.
    #[error("Server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Response body did not match the expected envelope.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured timeout; 0 means "see config"
            SyncError::Timeout(0)
        } else if err.is_connect() {
            SyncError::RequestFailed(format!("connection failed: {err}"))
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidResponse(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation may be retried with backoff.
    ///
    /// ## Retryable
    /// - Connection failures and timeouts
    /// - 5xx server responses
    ///
    /// ## Non-Retryable
    /// - Domain validation failures (retrying cannot fix the input)
    /// - 4xx server responses
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RequestFailed(_) | SyncError::Timeout(_) => true,
            SyncError::ServerRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::RequestFailed("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::ServerRejected {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());

        assert!(!SyncError::ServerRejected {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!SyncError::Core(CoreError::InvalidTable("widgets".into())).is_retryable());
    }

    #[test]
    fn test_core_error_passes_through() {
        let err = SyncError::from(CoreError::InvalidTable("widgets".into()));
        assert_eq!(err.to_string(), "Unknown sync table: widgets");
    }
}
