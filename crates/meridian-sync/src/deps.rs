//! # Dependency Resolver
//!
//! Determines which foreign-key dependencies a set of records requires and
//! which of those are absent from the target store.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Dependency Resolution                                 │
//! │                                                                         │
//! │  check(jobs, [job-1, job-2])                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load records ──► read declared edges (customerId, serviceTypeId)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  group referenced ids per dependency table                             │
//! │       │            customers: {cust-1, cust-2}                         │
//! │       │            service_types: {svc-1}                              │
//! │       ▼                                                                 │
//! │  ONE existence query per dependency table                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  per-record report: ready │ missing deps │ malformed reference         │
//! │                                                                         │
//! │  Pure read: resolution never writes.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use meridian_core::{MissingDependency, SyncRecord, SyncTable};
use meridian_db::RecordRepository;

use crate::error::SyncResult;

// =============================================================================
// Dependency Status
// =============================================================================

/// Per-record result of a dependency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Every declared edge resolves (or the table declares none).
    Ready,
    /// One or more referenced records are absent from the store.
    Missing(Vec<MissingDependency>),
    /// A declared reference field is absent or null in the payload.
    /// The record can never become ready; it is rejected, not queued.
    MalformedReference { field: &'static str },
}

impl DependencyStatus {
    /// Whether the record may be applied now.
    pub fn is_ready(&self) -> bool {
        matches!(self, DependencyStatus::Ready)
    }
}

/// Wire-facing report for the dependency check endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyReport {
    /// The record the report is about.
    pub record_id: String,
    /// Whether the record itself exists in the store.
    pub found: bool,
    /// Whether all dependencies resolve.
    pub ready: bool,
    /// Referenced records absent from the store.
    pub missing: Vec<MissingDependency>,
    /// Declared reference fields absent or null in the payload.
    pub malformed_fields: Vec<String>,
}

// =============================================================================
// Dependency Resolver
// =============================================================================

/// Checks declared foreign-key edges against the record store.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    records: RecordRepository,
}

impl DependencyResolver {
    /// Creates a resolver over the given record store.
    pub fn new(records: RecordRepository) -> Self {
        DependencyResolver { records }
    }

    /// Checks a single (possibly not-yet-stored) record.
    ///
    /// This is the upload/download arrival path: the record is in hand, not
    /// in the store.
    pub async fn check_record(
        &self,
        table: SyncTable,
        record: &SyncRecord,
    ) -> SyncResult<DependencyStatus> {
        let edges = table.dependencies();
        if edges.is_empty() {
            return Ok(DependencyStatus::Ready);
        }

        let mut missing = Vec::new();
        for edge in edges {
            let Some(referenced) = record.reference(edge.field) else {
                return Ok(DependencyStatus::MalformedReference { field: edge.field });
            };

            let wanted = vec![referenced.to_string()];
            let found = self.records.existing_ids(edge.table, &wanted).await?;
            if !found.contains(referenced) {
                missing.push(MissingDependency {
                    table: edge.table,
                    id: referenced.to_string(),
                });
            }
        }

        if missing.is_empty() {
            Ok(DependencyStatus::Ready)
        } else {
            Ok(DependencyStatus::Missing(missing))
        }
    }

    /// Checks a set of already-stored records, batching existence queries:
    /// one per dependency table, regardless of how many records are checked.
    pub async fn check(
        &self,
        table: SyncTable,
        record_ids: &[String],
    ) -> SyncResult<Vec<DependencyReport>> {
        let edges = table.dependencies();
        let stored = self.records.fetch_by_ids(table, record_ids).await?;
        let by_id: HashMap<&str, &SyncRecord> =
            stored.iter().map(|r| (r.id.as_str(), r)).collect();

        // Gather referenced ids per dependency table
        let mut referenced: HashMap<SyncTable, HashSet<String>> = HashMap::new();
        for record in &stored {
            for edge in edges {
                if let Some(id) = record.reference(edge.field) {
                    referenced.entry(edge.table).or_default().insert(id.to_string());
                }
            }
        }

        // One existence query per dependency table
        let mut existing: HashMap<SyncTable, HashSet<String>> = HashMap::new();
        for (dep_table, ids) in &referenced {
            let ids: Vec<String> = ids.iter().cloned().collect();
            existing.insert(*dep_table, self.records.existing_ids(*dep_table, &ids).await?);
        }

        let mut reports = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            let Some(record) = by_id.get(record_id.as_str()) else {
                reports.push(DependencyReport {
                    record_id: record_id.clone(),
                    found: false,
                    ready: false,
                    missing: Vec::new(),
                    malformed_fields: Vec::new(),
                });
                continue;
            };

            let mut missing = Vec::new();
            let mut malformed = Vec::new();
            for edge in edges {
                match record.reference(edge.field) {
                    Some(id) => {
                        let known = existing
                            .get(&edge.table)
                            .is_some_and(|set| set.contains(id));
                        if !known {
                            missing.push(MissingDependency {
                                table: edge.table,
                                id: id.to_string(),
                            });
                        }
                    }
                    None => malformed.push(edge.field.to_string()),
                }
            }

            reports.push(DependencyReport {
                record_id: record_id.clone(),
                found: true,
                ready: missing.is_empty() && malformed.is_empty(),
                missing,
                malformed_fields: malformed,
            });
        }

        Ok(reports)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_db::{Database, DbConfig};
    use serde_json::json;

    fn record(table_field: serde_json::Value) -> SyncRecord {
        SyncRecord::from_value(table_field).unwrap()
    }

    async fn setup() -> (Database, DependencyResolver) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resolver = DependencyResolver::new(db.records());
        (db, resolver)
    }

    #[tokio::test]
    async fn test_table_without_edges_is_trivially_ready() {
        let (_db, resolver) = setup().await;
        let customer = record(json!({
            "id": "c1", "deviceId": "d1", "updatedAt": "2026-03-01T10:00:00Z"
        }));

        let status = resolver
            .check_record(SyncTable::Customers, &customer)
            .await
            .unwrap();
        assert_eq!(status, DependencyStatus::Ready);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_reported() {
        let (_db, resolver) = setup().await;
        let job = record(json!({
            "id": "j1", "deviceId": "d1", "updatedAt": "2026-03-01T10:00:00Z",
            "customerId": "c1", "serviceTypeId": "s1"
        }));

        let status = resolver.check_record(SyncTable::Jobs, &job).await.unwrap();
        match status {
            DependencyStatus::Missing(missing) => {
                assert_eq!(missing.len(), 2);
                assert_eq!(missing[0].table, SyncTable::Customers);
                assert_eq!(missing[1].table, SyncTable::ServiceTypes);
            }
            other => panic!("expected missing deps, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_becomes_ready_once_dependencies_exist() {
        let (db, resolver) = setup().await;

        db.records()
            .apply_if_newer(
                SyncTable::Customers,
                &record(json!({
                    "id": "c1", "deviceId": "d1", "updatedAt": "2026-03-01T09:00:00Z"
                })),
            )
            .await
            .unwrap();
        db.records()
            .apply_if_newer(
                SyncTable::ServiceTypes,
                &record(json!({
                    "id": "s1", "deviceId": "d1", "updatedAt": "2026-03-01T09:00:00Z"
                })),
            )
            .await
            .unwrap();

        let job = record(json!({
            "id": "j1", "deviceId": "d1", "updatedAt": "2026-03-01T10:00:00Z",
            "customerId": "c1", "serviceTypeId": "s1"
        }));
        let status = resolver.check_record(SyncTable::Jobs, &job).await.unwrap();
        assert_eq!(status, DependencyStatus::Ready);
    }

    #[tokio::test]
    async fn test_null_reference_field_is_malformed() {
        let (_db, resolver) = setup().await;
        let job = record(json!({
            "id": "j1", "deviceId": "d1", "updatedAt": "2026-03-01T10:00:00Z",
            "customerId": null, "serviceTypeId": "s1"
        }));

        let status = resolver.check_record(SyncTable::Jobs, &job).await.unwrap();
        assert_eq!(
            status,
            DependencyStatus::MalformedReference { field: "customerId" }
        );
    }

    #[tokio::test]
    async fn test_batch_check_reports_per_record() {
        let (db, resolver) = setup().await;
        let records = db.records();

        records
            .apply_if_newer(
                SyncTable::Customers,
                &record(json!({
                    "id": "c1", "deviceId": "d1", "updatedAt": "2026-03-01T09:00:00Z"
                })),
            )
            .await
            .unwrap();
        records
            .apply_if_newer(
                SyncTable::ServiceTypes,
                &record(json!({
                    "id": "s1", "deviceId": "d1", "updatedAt": "2026-03-01T09:00:00Z"
                })),
            )
            .await
            .unwrap();

        // j1 fully satisfied; j2 references a missing customer
        for (id, cust) in [("j1", "c1"), ("j2", "c999")] {
            records
                .apply_if_newer(
                    SyncTable::Jobs,
                    &record(json!({
                        "id": id, "deviceId": "d1", "updatedAt": "2026-03-01T10:00:00Z",
                        "customerId": cust, "serviceTypeId": "s1"
                    })),
                )
                .await
                .unwrap();
        }

        let reports = resolver
            .check(
                SyncTable::Jobs,
                &["j1".to_string(), "j2".to_string(), "j3".to_string()],
            )
            .await
            .unwrap();

        assert!(reports[0].ready);
        assert!(!reports[1].ready);
        assert_eq!(reports[1].missing.len(), 1);
        assert_eq!(reports[1].missing[0].id, "c999");
        assert!(!reports[2].found);
    }
}
