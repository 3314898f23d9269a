//! # Sync Routes
//!
//! The upload/download/batch/queue/conflict endpoints under `/sync`.
//!
//! Handlers are thin: parse and validate request shape, delegate to the
//! [`SyncCoordinator`], wrap the outcome in the envelope. All sync
//! semantics live in the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
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
pub struct UploadRequest {
    pub table_name: String,
    #[serde(default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    pub table_name: String,
    pub since: Option<String>,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchUploadRequest {
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDownloadQuery {
    /// Comma-separated table names.
    pub tables: String,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ConflictsQuery {
    pub limit: Option<u32>,
    pub since: Option<String>,
}

/// Parses an optional RFC 3339 `since` parameter.
fn parse_since(since: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ApiError::Validation(format!("invalid 'since' timestamp: {e}")))
        })
        .transpose()
}

fn parse_table(name: &str) -> Result<SyncTable, ApiError> {
    name.parse::<SyncTable>().map_err(ApiError::from)
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /sync/upload`
pub async fn upload(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
    Json(request): Json<UploadRequest>,
) -> Result<Json<Value>, ApiError> {
    let table = parse_table(&request.table_name)?;
    let outcome = state.coordinator.upload(&device_id, table, request.records).await?;
    Ok(envelope(outcome))
}

/// `GET /sync/download`
pub async fn download(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
    Query(query): Query<DownloadQuery>,
) -> Result<Json<Value>, ApiError> {
    let table = parse_table(&query.table_name)?;
    let since = parse_since(query.since.as_deref())?;

    let page = state
        .coordinator
        .download(&device_id, table, since, query.cursor.as_deref(), query.limit)
        .await?;

    Ok(envelope(page))
}

/// `POST /sync/batch-upload`
pub async fn batch_upload(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
    Json(request): Json<BatchUploadRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.tables.is_empty() {
        return Err(ApiError::Validation("'tables' must not be empty".to_string()));
    }

    let outcome = state.coordinator.batch_upload(&device_id, request.tables).await?;
    Ok(envelope(outcome))
}

/// `GET /sync/batch-download`
pub async fn batch_download(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
    Query(query): Query<BatchDownloadQuery>,
) -> Result<Json<Value>, ApiError> {
    let tables: Vec<String> = query
        .tables
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    if tables.is_empty() {
        return Err(ApiError::Validation("'tables' must not be empty".to_string()));
    }

    let since = parse_since(query.since.as_deref())?;
    let outcome = state
        .coordinator
        .batch_download(&device_id, &tables, since, query.limit)
        .await?;

    Ok(envelope(outcome))
}

/// `GET /sync/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
    DeviceId(device_id): DeviceId,
) -> Result<Json<Value>, ApiError> {
    let report = state.coordinator.status(&device_id).await?;
    Ok(envelope(report))
}

/// `GET /sync/queue`
pub async fn queue(
    State(state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let entries = state
        .coordinator
        .queue()
        .snapshot(query.limit.unwrap_or(100))
        .await?;
    Ok(envelope(json!({ "entries": entries })))
}

/// `POST /sync/queue/process`
pub async fn process_queue(
    State(state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .coordinator
        .process_queue(query.limit.unwrap_or(100))
        .await?;
    Ok(envelope(summary))
}

/// `GET /sync/conflicts`
pub async fn conflicts(
    State(state): State<Arc<AppState>>,
    DeviceId(_device_id): DeviceId,
    Query(query): Query<ConflictsQuery>,
) -> Result<Json<Value>, ApiError> {
    let since = parse_since(query.since.as_deref())?;
    let entries = state
        .coordinator
        .database()
        .conflicts()
        .list(query.limit.unwrap_or(100), since)
        .await
        .map_err(meridian_sync::SyncError::from)?;

    Ok(envelope(json!({ "conflicts": entries })))
}
