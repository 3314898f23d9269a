//! # Conflict Policy
//!
//! The pure last-write-wins decision and the audit record written when a
//! version loses.
//!
//! ## Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Last-Write-Wins Resolution                            │
//! │                                                                         │
//! │   incoming record                                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   stored copy exists? ──no──► INSERT (no conflict, nothing logged)     │
//! │        │yes                                                             │
//! │        ▼                                                                │
//! │   incoming.updatedAt > stored.updatedAt?                               │
//! │        │yes                       │no (older OR equal)                 │
//! │        ▼                          ▼                                     │
//! │   OVERWRITE                   DISCARD incoming                          │
//! │   (not logged)                (ConflictRecord appended)                 │
//! │                                                                         │
//! │   Ties keep the stored copy: the server's copy is authoritative,       │
//! │   so resolution is stable regardless of arrival order.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Known limitation, preserved deliberately: resolution is full-record.
//! Concurrent edits to different fields of the same record produce one
//! whole-record winner; the loser's other-field changes are dropped and the
//! only trace is the conflict log entry holding the losing payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::SyncRecord;
use crate::table::SyncTable;

// =============================================================================
// Conflict Decision
// =============================================================================

/// Outcome of comparing an incoming record against the stored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// No stored copy: insert unconditionally.
    Insert,
    /// Incoming is strictly newer: overwrite the stored copy.
    Overwrite,
    /// Incoming is older or equal: discard it and log a conflict.
    Discard,
}

impl ConflictDecision {
    /// Decides between an incoming record and the stored copy, if any.
    ///
    /// Pure and total: both records are already metadata-validated, so the
    /// comparison cannot fail. Applying two versions of the same id in
    /// either order converges on the one with the larger `updated_at`.
    pub fn decide(incoming: &SyncRecord, stored: Option<&SyncRecord>) -> Self {
        match stored {
            None => ConflictDecision::Insert,
            Some(existing) if incoming.updated_at > existing.updated_at => {
                ConflictDecision::Overwrite
            }
            Some(_) => ConflictDecision::Discard,
        }
    }

    /// Whether the incoming record becomes the stored version.
    pub fn applies(&self) -> bool {
        !matches!(self, ConflictDecision::Discard)
    }
}

// =============================================================================
// Conflict Record
// =============================================================================

/// Audit entry appended whenever a record version is discarded.
///
/// Never mutates domain state; retained so silently-dropped writes stay
/// inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Audit entry id.
    pub id: String,

    /// Table the contested record belongs to.
    pub table: SyncTable,

    /// Contested record id.
    pub record_id: String,

    /// Device whose version was kept.
    pub winner_device_id: String,

    /// Device whose version was discarded.
    pub loser_device_id: String,

    /// Timestamp of the kept version.
    pub winner_updated_at: DateTime<Utc>,

    /// Timestamp of the discarded version.
    pub loser_updated_at: DateTime<Utc>,

    /// Full payload of the discarded version.
    pub loser_payload: serde_json::Value,

    /// When the resolution happened (server clock).
    pub resolved_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Builds the audit entry for a discarded incoming version.
    ///
    /// `stored` is the surviving copy, `discarded` the incoming record that
    /// lost; `resolved_at` is the server's wall-clock time, passed in so
    /// this constructor stays clock-free.
    pub fn discarded(
        table: SyncTable,
        stored: &SyncRecord,
        discarded: &SyncRecord,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        ConflictRecord {
            id: Uuid::new_v4().to_string(),
            table,
            record_id: discarded.id.clone(),
            winner_device_id: stored.device_id.clone(),
            loser_device_id: discarded.device_id.clone(),
            winner_updated_at: stored.updated_at,
            loser_updated_at: discarded.updated_at,
            loser_payload: discarded.payload.clone(),
            resolved_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, device: &str, updated_at: &str) -> SyncRecord {
        SyncRecord::from_value(json!({
            "id": id,
            "deviceId": device,
            "updatedAt": updated_at,
            "balanceCents": 500
        }))
        .unwrap()
    }

    #[test]
    fn test_insert_when_no_stored_copy() {
        let incoming = record("c1", "device-a", "2026-03-01T10:00:00Z");
        assert_eq!(
            ConflictDecision::decide(&incoming, None),
            ConflictDecision::Insert
        );
    }

    #[test]
    fn test_newer_incoming_overwrites() {
        let stored = record("c1", "device-a", "2026-03-01T10:00:00Z");
        let incoming = record("c1", "device-b", "2026-03-01T10:05:00Z");
        assert_eq!(
            ConflictDecision::decide(&incoming, Some(&stored)),
            ConflictDecision::Overwrite
        );
    }

    #[test]
    fn test_older_incoming_is_discarded() {
        let stored = record("c1", "device-a", "2026-03-01T10:05:00Z");
        let incoming = record("c1", "device-b", "2026-03-01T10:00:00Z");
        assert_eq!(
            ConflictDecision::decide(&incoming, Some(&stored)),
            ConflictDecision::Discard
        );
    }

    #[test]
    fn test_tie_keeps_stored_copy() {
        let stored = record("c1", "device-a", "2026-03-01T10:00:00Z");
        let incoming = record("c1", "device-b", "2026-03-01T10:00:00Z");
        assert_eq!(
            ConflictDecision::decide(&incoming, Some(&stored)),
            ConflictDecision::Discard
        );
    }

    /// Applying two versions in either order converges on the larger
    /// `updatedAt`: the commutativity guarantee, at the decision level.
    #[test]
    fn test_resolution_is_order_independent() {
        let older = record("c1", "device-a", "2026-03-01T10:00:00Z");
        let newer = record("c1", "device-b", "2026-03-01T10:05:00Z");

        // older first, then newer: newer overwrites
        assert!(ConflictDecision::decide(&newer, Some(&older)).applies());

        // newer first, then older: older is discarded
        assert!(!ConflictDecision::decide(&older, Some(&newer)).applies());
    }

    #[test]
    fn test_conflict_record_captures_loser() {
        let stored = record("c1", "device-a", "2026-03-01T10:05:00Z");
        let discarded = record("c1", "device-b", "2026-03-01T10:00:00Z");
        let resolved_at = stored.updated_at;

        let entry = ConflictRecord::discarded(SyncTable::Customers, &stored, &discarded, resolved_at);

        assert_eq!(entry.record_id, "c1");
        assert_eq!(entry.winner_device_id, "device-a");
        assert_eq!(entry.loser_device_id, "device-b");
        assert_eq!(entry.loser_payload["balanceCents"], 500);
        assert!(entry.winner_updated_at > entry.loser_updated_at);
    }
}
