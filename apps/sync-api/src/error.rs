//! # API Error Types
//!
//! The only place sync failures become wire envelopes.
//!
//! ## Taxonomy → HTTP Status
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ValidationError   400  malformed/oversized request, bad parameters    │
//! │  InvalidTable      400  table not in the tier configuration            │
//! │  MissingDeviceId   400  request lacked the device identity header      │
//! │  NotFoundError     404  referenced entity absent                       │
//! │  Internal          500  database/engine failure (message withheld      │
//! │                         outside debug builds)                          │
//! │                                                                         │
//! │  Per-record failures (malformed records, conflicts, queued deps)       │
//! │  are NOT errors: they travel inside a 200 response's rejected list.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers return `Result<_, ApiError>` and propagate with `?`; the
//! `IntoResponse` impl below is the single conversion point to the uniform
//! `{success: false, error, message}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use meridian_core::CoreError;
use meridian_sync::SyncError;

/// Wire-facing API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or oversized request.
    #[error("{0}")]
    Validation(String),

    /// Unknown or undeclared table name.
    #[error("{0}")]
    InvalidTable(String),

    /// Request lacked the device identity header.
    #[error("Missing X-Device-Id header")]
    MissingDeviceId,

    /// Referenced entity absent.
    #[error("{0}")]
    NotFound(String),

    /// Database or engine failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The stable `error` field value for the envelope.
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::InvalidTable(_) => "InvalidTable",
            ApiError::MissingDeviceId => "MissingDeviceId",
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::Internal(_) => "InternalError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidTable(_)
            | ApiError::MissingDeviceId => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTable(_) => ApiError::InvalidTable(err.to_string()),
            CoreError::MalformedRecord { .. }
            | CoreError::BatchTooLarge { .. }
            | CoreError::Required { .. }
            | CoreError::OutOfRange { .. }
            | CoreError::InvalidCursor(_) => ApiError::Validation(err.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Core(core) => core.into(),
            SyncError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx details stay in the logs outside debug builds.
        let message = if status.is_server_error() && !cfg!(debug_assertions) {
            tracing::error!(error = %self, "Internal error reached the transport boundary");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "error": self.code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("too big".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::MissingDeviceId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::NotFound("customer c1".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("db down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = CoreError::InvalidTable("widgets".into()).into();
        assert_eq!(err.code(), "InvalidTable");

        let err: ApiError = CoreError::BatchTooLarge { len: 900, max: 500 }.into();
        assert_eq!(err.code(), "ValidationError");
    }
}
