//! # Sync Records
//!
//! The in-memory form of one synchronized row, its lifecycle status, and the
//! download watermark type.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Status Lifecycle                              │
//! │                                                                         │
//! │   local mutation                                                        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │    ┌─────────┐   server ack (accepted)    ┌─────────┐                  │
//! │    │ PENDING │ ─────────────────────────► │ SYNCED  │                  │
//! │    └─────────┘                            └─────────┘                  │
//! │        │                                       ▲                        │
//! │        │ server rejected / timed out           │ operator retry        │
//! │        ▼                                       │ (mark pending again)  │
//! │    ┌─────────┐ ──────────────────────────────┘                        │
//! │    │ FAILED  │                                                         │
//! │    └─────────┘                                                         │
//! │                                                                         │
//! │  Local CRUD never blocks on sync; status is a badge, not a gate.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! `id` is client-generated and globally unique across devices (UUID, not a
//! per-device autoincrement), so records from different devices never
//! collide accidentally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Sync Status
// =============================================================================

/// Per-record sync lifecycle state on the originating device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Created or modified locally, not yet acknowledged by the server.
    Pending,
    /// Acknowledged by the server as the accepted version.
    Synced,
    /// Rejected by the server or timed out; awaiting operator action.
    Failed,
}

impl SyncStatus {
    /// Stable column value for persistence.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    /// Parses a persisted column value.
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(CoreError::MalformedRecord {
                id: String::new(),
                reason: format!("unknown sync status '{other}'"),
            }),
        }
    }
}

// =============================================================================
// Sync Record
// =============================================================================

/// One row of a synchronized table, metadata extracted and validated.
///
/// `payload` is the full wire object (metadata fields included) so the
/// engine never has to reassemble a record for storage or re-delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Globally unique, client-generated record id.
    pub id: String,

    /// Device that produced this version.
    pub device_id: String,

    /// Wall-clock timestamp set by the originating device. Drives
    /// last-write-wins resolution, hence the strict validation below.
    pub updated_at: DateTime<Utc>,

    /// Full record object as received on the wire.
    pub payload: Value,
}

impl SyncRecord {
    /// Extracts and validates sync metadata from a wire object.
    ///
    /// ## Validation
    /// - `id` must be a non-empty string
    /// - `deviceId` must be a non-empty string
    /// - `updatedAt` must be an RFC 3339 timestamp
    ///
    /// A record failing any of these is rejected with
    /// [`CoreError::MalformedRecord`] rather than guessed at: without a
    /// trustworthy `updatedAt` the conflict policy cannot order versions.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let obj = value.as_object().ok_or_else(|| CoreError::MalformedRecord {
            id: String::new(),
            reason: "record must be a JSON object".to_string(),
        })?;

        let id = match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                return Err(CoreError::MalformedRecord {
                    id: String::new(),
                    reason: "missing or empty 'id'".to_string(),
                })
            }
        };

        let device_id = match obj.get("deviceId").and_then(Value::as_str) {
            Some(d) if !d.trim().is_empty() => d.to_string(),
            _ => {
                return Err(CoreError::MalformedRecord {
                    id,
                    reason: "missing or empty 'deviceId'".to_string(),
                })
            }
        };

        let updated_at = match obj.get("updatedAt").and_then(Value::as_str) {
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| CoreError::MalformedRecord {
                    id: id.clone(),
                    reason: format!("unparsable 'updatedAt': {e}"),
                })?,
            None => {
                return Err(CoreError::MalformedRecord {
                    id,
                    reason: "missing 'updatedAt'".to_string(),
                })
            }
        };

        Ok(SyncRecord {
            id,
            device_id,
            updated_at,
            payload: value,
        })
    }

    /// Reads a referenced id from the payload, as named by a dependency edge.
    ///
    /// Returns `None` when the field is absent, null, or not a string; the
    /// dependency resolver treats all three as an unmet reference.
    pub fn reference(&self, field: &str) -> Option<&str> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Millisecond form of `updated_at`, the unit stored and compared in
    /// the record store.
    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }
}

/// Validates an upload batch against the size cap.
pub fn validate_batch_size(len: usize, max: usize) -> CoreResult<()> {
    if len > max {
        return Err(CoreError::BatchTooLarge { len, max });
    }
    Ok(())
}

// =============================================================================
// Watermark
// =============================================================================

/// The download cursor tuple: last successfully delivered `(updated_at, id)`.
///
/// Pages compare with a strict `>` on the tuple so repeating a call with the
/// same cursor can neither skip nor duplicate records, even under concurrent
/// writes landing at equal timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub updated_at: DateTime<Utc>,
    pub id: String,
}

impl Watermark {
    /// The origin watermark: everything is newer than this.
    pub fn origin() -> Self {
        Watermark {
            updated_at: DateTime::<Utc>::from_timestamp_millis(0).unwrap_or_default(),
            id: String::new(),
        }
    }

    /// A watermark at a bare timestamp with an empty id tiebreaker, so
    /// records AT the timestamp are still delivered.
    pub fn since(updated_at: DateTime<Utc>) -> Self {
        Watermark {
            updated_at,
            id: String::new(),
        }
    }

    /// Encodes as the opaque wire cursor `"<millis>:<id>"`.
    pub fn encode(&self) -> String {
        format!("{}:{}", self.updated_at.timestamp_millis(), self.id)
    }

    /// Parses a wire cursor produced by [`Watermark::encode`].
    pub fn parse(cursor: &str) -> CoreResult<Self> {
        let (millis, id) = cursor
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidCursor(cursor.to_string()))?;
        let millis: i64 = millis
            .parse()
            .map_err(|_| CoreError::InvalidCursor(cursor.to_string()))?;
        let updated_at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| CoreError::InvalidCursor(cursor.to_string()))?;
        Ok(Watermark {
            updated_at,
            id: id.to_string(),
        })
    }

    /// Millisecond form of the timestamp component.
    pub fn updated_at_ms(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
