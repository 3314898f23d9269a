//! # Retry Queue Types
//!
//! Entries for records that arrived before their dependencies.
//!
//! ## Entry State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Queue Entry Lifecycle                              │
//! │                                                                         │
//! │   dependency check fails on arrival                                     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │    ┌─────────┐  deps satisfied, record applied   ┌──────────┐          │
//! │    │ QUEUED  │ ────────────────────────────────► │ APPLIED  │ (row     │
//! │    └─────────┘                                   └──────────┘  deleted)│
//! │        │                                                                │
//! │        │ attempts > MAX_QUEUE_ATTEMPTS                                  │
//! │        ▼                                                                │
//! │   ┌───────────┐                                                         │
//! │   │ EXHAUSTED │  retained for diagnostics, excluded from sweeps        │
//! │   └───────────┘                                                         │
//! │                                                                         │
//! │  Sweeps run FIFO by enqueue time to bound starvation.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::SyncRecord;
use crate::table::SyncTable;

// =============================================================================
// Missing Dependency
// =============================================================================

/// One unresolved foreign-key reference: `table` has no record with `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDependency {
    pub table: SyncTable,
    pub id: String,
}

impl std::fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

// =============================================================================
// Queue Entry
// =============================================================================

/// A record held back because its dependencies were not yet satisfied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Queue entry id.
    pub id: String,

    /// Table the held record targets.
    pub table: SyncTable,

    /// Held record id.
    pub record_id: String,

    /// Full record payload, re-validated and applied once ready.
    pub payload: serde_json::Value,

    /// Dependencies that were missing at the last check.
    pub missing: Vec<MissingDependency>,

    /// Sweeps that have retried this entry so far.
    pub attempts: i64,

    /// Terminal: attempts exceeded the threshold. Kept for diagnostics.
    pub exhausted: bool,

    /// When the entry was first queued. Sweep order key (FIFO).
    pub enqueued_at: DateTime<Utc>,

    /// When a sweep last retried this entry.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Builds a fresh entry for a record that failed dependency validation.
    ///
    /// `enqueued_at` is passed in (server clock) so construction stays
    /// clock-free.
    pub fn new(
        table: SyncTable,
        record: &SyncRecord,
        missing: Vec<MissingDependency>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        QueueEntry {
            id: Uuid::new_v4().to_string(),
            table,
            record_id: record.id.clone(),
            payload: record.payload.clone(),
            missing,
            attempts: 0,
            exhausted: false,
            enqueued_at,
            last_attempt_at: None,
        }
    }

    /// Human-readable reason string reported to the uploader.
    pub fn rejection_reason(&self) -> String {
        let deps: Vec<String> = self.missing.iter().map(ToString::to_string).collect();
        format!("queued: missing {}", deps.join(", "))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejection_reason_lists_dependencies() {
        let record = SyncRecord::from_value(json!({
            "id": "job-1",
            "deviceId": "device-a",
            "updatedAt": "2026-03-01T09:00:00Z",
            "customerId": "cust-9",
            "serviceTypeId": "svc-2"
        }))
        .unwrap();

        let entry = QueueEntry::new(
            SyncTable::Jobs,
            &record,
            vec![
                MissingDependency {
                    table: SyncTable::Customers,
                    id: "cust-9".to_string(),
                },
                MissingDependency {
                    table: SyncTable::ServiceTypes,
                    id: "svc-2".to_string(),
                },
            ],
            record.updated_at,
        );

        assert_eq!(
            entry.rejection_reason(),
            "queued: missing customers/cust-9, service_types/svc-2"
        );
        assert_eq!(entry.attempts, 0);
        assert!(!entry.exhausted);
    }
}
