//! # Dependency Routes
//!
//! Endpoints devices use to inspect and backfill foreign-key dependencies:
//! fetch referenced records by id, check which dependencies of stored
//! records are unmet, and read a table's tier/edge declaration.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use meridian_core::SyncTable;

use crate::error::ApiError;
use crate::extract::DeviceId;
use crate::routes::envelope;
use crate::AppState;

// =============================================================================
// Request Shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub table_name: String,
    #[serde(default)]
    pub record_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub table_name: String,
    /// Comma-separated record ids.
    pub ids: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /dependencies/fetch`: returns the named records so a device can
/// backfill dependencies it is missing.
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Json(request): Json<FetchRequest>,
) -> Result<Json<Value>, ApiError> {
    let table: SyncTable = request.table_name.parse().map_err(ApiError::from)?;
    if request.record_ids.is_empty() {
        return Err(ApiError::Validation("'recordIds' must not be empty".to_string()));
    }

    let records = state
        .coordinator
        .database()
        .records()
        .fetch_by_ids(table, &request.record_ids)
        .await
        .map_err(meridian_sync::SyncError::from)?;

    let payloads: Vec<Value> = records.into_iter().map(|r| r.payload).collect();
    Ok(envelope(json!({ "records": payloads })))
}

/// `GET /dependencies/check`: per-record report of unmet dependencies.
pub async fn check(
    State(state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Query(query): Query<CheckQuery>,
) -> Result<Json<Value>, ApiError> {
    let table: SyncTable = query.table_name.parse().map_err(ApiError::from)?;
    let ids: Vec<String> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    if ids.is_empty() {
        return Err(ApiError::Validation("'ids' must not be empty".to_string()));
    }

    let reports = state.coordinator.resolver().check(table, &ids).await?;
    Ok(envelope(json!({ "reports": reports })))
}

/// `GET /dependencies/info/{tableName}`: the table's tier and declared
/// edges, straight from the closed configuration.
pub async fn info(
    State(_state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Path(table_name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let table: SyncTable = table_name.parse().map_err(ApiError::from)?;

    let dependencies: Vec<Value> = table
        .dependencies()
        .iter()
        .map(|edge| {
            json!({
                "field": edge.field,
                "table": edge.table.as_str(),
            })
        })
        .collect();

    Ok(envelope(json!({
        "tableName": table.as_str(),
        "tier": table.tier(),
        "dependencies": dependencies,
    })))
}
