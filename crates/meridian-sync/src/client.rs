//! # Sync HTTP Client
//!
//! Device-side client for the sync server's HTTP+JSON API.
//!
//! ## Envelope Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Request / Response Shape                           │
//! │                                                                         │
//! │  Request headers                                                        │
//! │    X-Device-Id:        this installation's stable id                   │
//! │    X-Client-Timestamp: our wall clock (lets the server measure skew)   │
//! │                                                                         │
//! │  Response                                                               │
//! │    2xx  {success: true, ...payload}        → typed response            │
//! │    4xx/5xx {success: false, error, message} → SyncError::ServerRejected│
//! │                                                                         │
//! │  Response headers                                                       │
//! │    X-Server-Timestamp:     authoritative time, always present          │
//! │    X-Clock-Skew-Seconds:   present when our clock drifted too far      │
//! │                            (logged, never fatal)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::coordinator::{
    BatchDownloadOutcome, BatchUploadOutcome, DownloadPage, UploadOutcome,
};
use crate::error::{SyncError, SyncResult};
use crate::queue::SweepSummary;
use meridian_core::SyncTable;

// =============================================================================
// Wire Responses
// =============================================================================

/// `POST /sync/upload` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: UploadOutcome,
    pub server_timestamp: String,
}

/// `GET /sync/download` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub page: DownloadPage,
    pub server_timestamp: String,
}

/// `POST /sync/batch-upload` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: BatchUploadOutcome,
    pub server_timestamp: String,
}

/// `GET /sync/batch-download` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDownloadResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: BatchDownloadOutcome,
    pub server_timestamp: String,
}

/// `POST /sync/queue/process` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQueueResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: SweepSummary,
    pub server_timestamp: String,
}

/// `POST /dependencies/fetch` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchDependenciesResponse {
    pub success: bool,
    pub records: Vec<Value>,
    pub server_timestamp: String,
}

/// Failure envelope body.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[allow(dead_code)]
    success: bool,
    error: String,
    message: String,
}

// =============================================================================
// Sync Client
// =============================================================================

/// HTTP client for one device talking to the sync server.
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
    device_id: String,
}

impl SyncClient {
    /// Creates a client with a bounded request timeout.
    pub fn new(
        base_url: impl Into<String>,
        device_id: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(SyncClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device_id: device_id.into(),
        })
    }

    /// The device identity this client presents.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn headers(&self) -> SyncResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Device-Id",
            HeaderValue::from_str(&self.device_id)
                .map_err(|_| SyncError::Internal("device id is not header-safe".to_string()))?,
        );
        let now = chrono::Utc::now().to_rfc3339();
        headers.insert(
            "X-Client-Timestamp",
            HeaderValue::from_str(&now)
                .map_err(|_| SyncError::Internal("timestamp is not header-safe".to_string()))?,
        );
        Ok(headers)
    }

    /// Surfaces a server-side skew warning, then decodes the body.
    async fn decode<T: for<'de> Deserialize<'de>>(&self, response: Response) -> SyncResult<T> {
        if let Some(skew) = response
            .headers()
            .get("X-Clock-Skew-Seconds")
            .and_then(|v| v.to_str().ok())
        {
            warn!(
                skew_secs = %skew,
                "Server reports our clock is skewed; correct the device clock"
            );
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => format!("{}: {}", body.error, body.message),
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };

        Err(SyncError::ServerRejected {
            status: status.as_u16(),
            message,
        })
    }

    /// `POST /sync/upload`
    pub async fn upload(
        &self,
        table: SyncTable,
        records: Vec<Value>,
    ) -> SyncResult<UploadResponse> {
        let response = self
            .http
            .post(format!("{}/sync/upload", self.base_url))
            .headers(self.headers()?)
            .json(&json!({ "tableName": table.as_str(), "records": records }))
            .send()
            .await?;

        self.decode(response).await
    }

    /// `GET /sync/download`
    pub async fn download(
        &self,
        table: SyncTable,
        cursor: Option<&str>,
        limit: u32,
    ) -> SyncResult<DownloadResponse> {
        let mut query: Vec<(&str, String)> = vec![
            ("tableName", table.as_str().to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/sync/download", self.base_url))
            .headers(self.headers()?)
            .query(&query)
            .send()
            .await?;

        self.decode(response).await
    }

    /// `POST /sync/batch-upload`
    pub async fn batch_upload(
        &self,
        tables: &BTreeMap<String, Vec<Value>>,
    ) -> SyncResult<BatchUploadResponse> {
        let response = self
            .http
            .post(format!("{}/sync/batch-upload", self.base_url))
            .headers(self.headers()?)
            .json(&json!({ "tables": tables }))
            .send()
            .await?;

        self.decode(response).await
    }

    /// `GET /sync/batch-download`
    pub async fn batch_download(
        &self,
        tables: &[SyncTable],
        since: Option<&str>,
        limit: u32,
    ) -> SyncResult<BatchDownloadResponse> {
        let names: Vec<&str> = tables.iter().map(SyncTable::as_str).collect();
        let mut query: Vec<(&str, String)> = vec![
            ("tables", names.join(",")),
            ("limit", limit.to_string()),
        ];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let response = self
            .http
            .get(format!("{}/sync/batch-download", self.base_url))
            .headers(self.headers()?)
            .query(&query)
            .send()
            .await?;

        self.decode(response).await
    }

    /// `POST /sync/queue/process`
    pub async fn process_queue(&self, limit: u32) -> SyncResult<ProcessQueueResponse> {
        let response = self
            .http
            .post(format!("{}/sync/queue/process", self.base_url))
            .headers(self.headers()?)
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;

        self.decode(response).await
    }

    /// `POST /dependencies/fetch`: backfills dependency records by id.
    pub async fn fetch_dependencies(
        &self,
        table: SyncTable,
        record_ids: &[String],
    ) -> SyncResult<FetchDependenciesResponse> {
        let response = self
            .http
            .post(format!("{}/dependencies/fetch", self.base_url))
            .headers(self.headers()?)
            .json(&json!({ "tableName": table.as_str(), "recordIds": record_ids }))
            .send()
            .await?;

        self.decode(response).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
