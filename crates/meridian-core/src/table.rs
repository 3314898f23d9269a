//! # Sync Table Configuration
//!
//! The closed set of synchronized tables, their dependency tiers, and the
//! foreign-key edges between them.
//!
//! ## Tier Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dependency Tiers                                  │
//! │                                                                         │
//! │  tier 0   customers          (no dependencies)                         │
//! │  tier 1   service_types      (no dependencies)                         │
//! │  tier 2   jobs               customerId ──► customers                  │
//! │                              serviceTypeId ──► service_types           │
//! │  tier 3   invoices           jobId ──► jobs                            │
//! │                              customerId ──► customers                  │
//! │  tier 4   payments           invoiceId ──► invoices                    │
//! │                                                                         │
//! │  INVARIANT: a table at tier n references only tables at tier < n.      │
//! │  Uploads and downloads always walk tiers in ascending order so a       │
//! │  dependent record never travels ahead of its prerequisites.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Why an enum instead of table-name strings?
//! Every table name entering the engine is parsed once at the boundary.
//! Past that point a `SyncTable` cannot name an unknown table, cannot be
//! misspelled, and carries its tier and edges with it at compile time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// =============================================================================
// Dependency Edge
// =============================================================================

/// A declared foreign-key relationship: records of the owning table carry
/// `field` in their payload, and the referenced id must exist in `table`
/// before the record can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Payload field holding the referenced record id (wire casing).
    pub field: &'static str,
    /// Table the referenced record must exist in.
    pub table: SyncTable,
}

// =============================================================================
// Sync Table
// =============================================================================

/// A synchronized domain table.
///
/// The variant order IS the tier order; [`SyncTable::in_tier_order`] relies
/// on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Customers,
    ServiceTypes,
    Jobs,
    Invoices,
    Payments,
}

impl SyncTable {
    /// All tables in ascending tier order.
    pub const fn in_tier_order() -> [SyncTable; 5] {
        [
            SyncTable::Customers,
            SyncTable::ServiceTypes,
            SyncTable::Jobs,
            SyncTable::Invoices,
            SyncTable::Payments,
        ]
    }

    /// The table's position in dependency order.
    pub const fn tier(&self) -> u8 {
        match self {
            SyncTable::Customers => 0,
            SyncTable::ServiceTypes => 1,
            SyncTable::Jobs => 2,
            SyncTable::Invoices => 3,
            SyncTable::Payments => 4,
        }
    }

    /// Declared foreign-key edges for this table.
    ///
    /// A record is ready only when **every** edge resolves. Tables with no
    /// edges are trivially ready.
    pub const fn dependencies(&self) -> &'static [DependencyEdge] {
        match self {
            SyncTable::Customers | SyncTable::ServiceTypes => &[],
            SyncTable::Jobs => &[
                DependencyEdge {
                    field: "customerId",
                    table: SyncTable::Customers,
                },
                DependencyEdge {
                    field: "serviceTypeId",
                    table: SyncTable::ServiceTypes,
                },
            ],
            SyncTable::Invoices => &[
                DependencyEdge {
                    field: "jobId",
                    table: SyncTable::Jobs,
                },
                DependencyEdge {
                    field: "customerId",
                    table: SyncTable::Customers,
                },
            ],
            SyncTable::Payments => &[DependencyEdge {
                field: "invoiceId",
                table: SyncTable::Invoices,
            }],
        }
    }

    /// The physical/wire table name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncTable::Customers => "customers",
            SyncTable::ServiceTypes => "service_types",
            SyncTable::Jobs => "jobs",
            SyncTable::Invoices => "invoices",
            SyncTable::Payments => "payments",
        }
    }
}

impl FromStr for SyncTable {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customers" => Ok(SyncTable::Customers),
            "service_types" => Ok(SyncTable::ServiceTypes),
            "jobs" => Ok(SyncTable::Jobs),
            "invoices" => Ok(SyncTable::Invoices),
            "payments" => Ok(SyncTable::Payments),
            other => Err(CoreError::InvalidTable(other.to_string())),
        }
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_is_ascending() {
        let tables = SyncTable::in_tier_order();
        for pair in tables.windows(2) {
            assert!(pair[0].tier() < pair[1].tier());
        }
    }

    #[test]
    fn test_dependencies_point_at_lower_tiers() {
        for table in SyncTable::in_tier_order() {
            for edge in table.dependencies() {
                assert!(
                    edge.table.tier() < table.tier(),
                    "{} depends on {} at an equal or higher tier",
                    table,
                    edge.table
                );
            }
        }
    }

    #[test]
    fn test_parse_known_tables() {
        assert_eq!("jobs".parse::<SyncTable>().unwrap(), SyncTable::Jobs);
        assert_eq!(
            "service_types".parse::<SyncTable>().unwrap(),
            SyncTable::ServiceTypes
        );
    }

    #[test]
    fn test_parse_unknown_table_fails() {
        let err = "widgets".parse::<SyncTable>().unwrap_err();
        assert_eq!(err, CoreError::InvalidTable("widgets".to_string()));
    }

    #[test]
    fn test_display_round_trips() {
        for table in SyncTable::in_tier_order() {
            assert_eq!(table.to_string().parse::<SyncTable>().unwrap(), table);
        }
    }

    #[test]
    fn test_leaf_tables_have_no_dependencies() {
        assert!(SyncTable::Customers.dependencies().is_empty());
        assert!(SyncTable::ServiceTypes.dependencies().is_empty());
    }
}
