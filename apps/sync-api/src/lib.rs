//! # Meridian Sync API
//!
//! HTTP+JSON server for multi-device synchronization.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync API Server                                │
//! │                                                                         │
//! │  Device ───► HTTP (8600) ───► Router ───► SyncCoordinator ───► SQLite │
//! │                                 │                                       │
//! │     X-Device-Id extractor ──────┤                                       │
//! │     clock-skew middleware ──────┤                                       │
//! │     TraceLayer ─────────────────┘                                       │
//! │                                                                         │
//! │  Endpoints                                                              │
//! │    POST /sync/upload            GET  /sync/download                    │
//! │    POST /sync/batch-upload      GET  /sync/batch-download              │
//! │    GET  /sync/status            GET  /sync/queue                       │
//! │    POST /sync/queue/process     GET  /sync/conflicts                   │
//! │    POST /dependencies/fetch     GET  /dependencies/check               │
//! │    GET  /dependencies/info/:t   GET  /health                           │
//! │                                                                         │
//! │  Envelope                                                               │
//! │    success: {success: true, ...payload, serverTimestamp}               │
//! │    failure: {success: false, error, message}                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `MERIDIAN_BIND_ADDR` - bind address (default: 0.0.0.0)
//! - `MERIDIAN_PORT` - HTTP port (default: 8600)
//! - `MERIDIAN_DATABASE_PATH` - SQLite path (default: ./meridian-sync.db)
//! - `MERIDIAN_QUEUE_SWEEP_INTERVAL_SECS` - automatic sweep period (default: 30)
//! - `MERIDIAN_QUEUE_SWEEP_LIMIT` - entries per automatic sweep (default: 100)

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod skew;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use meridian_db::Database;
use meridian_sync::SyncCoordinator;

// Re-exports
pub use config::ApiConfig;
pub use error::ApiError;

/// Shared application state.
pub struct AppState {
    /// The sync engine.
    pub coordinator: SyncCoordinator,
    /// Server configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Builds state over an opened database.
    pub fn new(db: Database, config: ApiConfig) -> Self {
        AppState {
            coordinator: SyncCoordinator::new(db),
            config,
        }
    }
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/upload", post(routes::sync::upload))
        .route("/sync/download", get(routes::sync::download))
        .route("/sync/batch-upload", post(routes::sync::batch_upload))
        .route("/sync/batch-download", get(routes::sync::batch_download))
        .route("/sync/status", get(routes::sync::status))
        .route("/sync/queue", get(routes::sync::queue))
        .route("/sync/queue/process", post(routes::sync::process_queue))
        .route("/sync/conflicts", get(routes::sync::conflicts))
        .route("/dependencies/fetch", post(routes::dependencies::fetch))
        .route("/dependencies/check", get(routes::dependencies::check))
        .route("/dependencies/info/{table_name}", get(routes::dependencies::info))
        .layer(axum::middleware::from_fn(skew::stamp))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handler Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, HeaderMap, Request, StatusCode};
    use meridian_db::DbConfig;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn test_app() -> Router {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = ApiConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            database_path: ":memory:".to_string(),
            queue_sweep_interval_secs: 0,
            queue_sweep_limit: 100,
        };
        router(Arc::new(AppState::new(db, config)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    fn upload_request(device: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/sync/upload")
            .header("X-Device-Id", device)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_device_id_is_rejected() {
        let app = test_app().await;
        let request = Request::builder()
            .method("GET")
            .uri("/sync/status")
            .body(Body::empty())
            .unwrap();

        let (status, _headers, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "MissingDeviceId");
    }

    #[tokio::test]
    async fn test_unknown_table_is_invalid() {
        let app = test_app().await;
        let request = upload_request(
            "device-a",
            json!({ "tableName": "widgets", "records": [] }),
        );

        let (status, _headers, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "InvalidTable");
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let app = test_app().await;

        let (status, _headers, body) = send(
            app.clone(),
            upload_request(
                "device-a",
                json!({
                    "tableName": "customers",
                    "records": [{
                        "id": "c1",
                        "deviceId": "device-a",
                        "updatedAt": "2026-03-01T10:00:00Z",
                        "name": "Acme"
                    }]
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["accepted"][0], "c1");
        assert!(body["serverTimestamp"].is_string());

        // another device sees the record; the uploader does not
        let request = Request::builder()
            .method("GET")
            .uri("/sync/download?tableName=customers")
            .header("X-Device-Id", "device-b")
            .body(Body::empty())
            .unwrap();
        let (status, _headers, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["records"][0]["id"], "c1");
        assert_eq!(body["hasMore"], false);

        let request = Request::builder()
            .method("GET")
            .uri("/sync/download?tableName=customers")
            .header("X-Device-Id", "device-a")
            .body(Body::empty())
            .unwrap();
        let (_status, _headers, body) = send(app, request).await;
        assert_eq!(body["records"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_server_timestamp_header_is_always_stamped() {
        let app = test_app().await;
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, headers, _body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.contains_key("x-server-timestamp"));
        assert!(!headers.contains_key("x-clock-skew-seconds"));
    }

    /// A client 10 minutes ahead gets a warning header, not a failure.
    #[tokio::test]
    async fn test_clock_skew_warns_but_accepts() {
        let app = test_app().await;
        let ahead = chrono::Utc::now() + chrono::Duration::minutes(10);
        let request = Request::builder()
            .method("GET")
            .uri("/sync/status")
            .header("X-Device-Id", "device-a")
            .header("X-Client-Timestamp", ahead.to_rfc3339())
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let skew: i64 = headers["x-clock-skew-seconds"]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(skew >= 595, "expected ~600s skew, got {skew}");
    }

    /// Tier order inside a batch body does not matter.
    #[tokio::test]
    async fn test_batch_upload_reorders_tiers() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/sync/batch-upload")
            .header("X-Device-Id", "device-a")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({
                    "tables": {
                        "jobs": [{
                            "id": "j1", "deviceId": "device-a",
                            "updatedAt": "2026-03-01T10:00:00Z",
                            "customerId": "c1", "serviceTypeId": "s1"
                        }],
                        "customers": [{
                            "id": "c1", "deviceId": "device-a",
                            "updatedAt": "2026-03-01T09:00:00Z"
                        }],
                        "service_types": [{
                            "id": "s1", "deviceId": "device-a",
                            "updatedAt": "2026-03-01T09:00:00Z"
                        }]
                    }
                })
                .to_string(),
            ))
            .unwrap();

        let (status, _headers, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tables"]["jobs"]["accepted"][0], "j1");
        assert_eq!(body["tables"]["customers"]["accepted"][0], "c1");
    }

    #[tokio::test]
    async fn test_dependency_info_exposes_tier_configuration() {
        let app = test_app().await;
        let request = Request::builder()
            .method("GET")
            .uri("/dependencies/info/jobs")
            .header("X-Device-Id", "device-a")
            .body(Body::empty())
            .unwrap();

        let (status, _headers, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tableName"], "jobs");
        assert_eq!(body["tier"], 2);
        assert_eq!(body["dependencies"][0]["field"], "customerId");
        assert_eq!(body["dependencies"][0]["table"], "customers");
    }

    #[tokio::test]
    async fn test_queue_endpoints_expose_blocked_records() {
        let app = test_app().await;

        // job with no customer goes to the queue
        let (_s, _h, body) = send(
            app.clone(),
            upload_request(
                "device-a",
                json!({
                    "tableName": "jobs",
                    "records": [{
                        "id": "j1", "deviceId": "device-a",
                        "updatedAt": "2026-03-01T10:00:00Z",
                        "customerId": "c1", "serviceTypeId": "s1"
                    }]
                }),
            ),
        )
        .await;
        assert!(body["rejected"][0]["reason"]
            .as_str()
            .unwrap()
            .starts_with("queued:"));

        let request = Request::builder()
            .method("GET")
            .uri("/sync/queue")
            .header("X-Device-Id", "device-a")
            .body(Body::empty())
            .unwrap();
        let (_s, _h, body) = send(app.clone(), request).await;
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);

        // a sweep without the dependency requeues rather than applies
        let request = Request::builder()
            .method("POST")
            .uri("/sync/queue/process?limit=10")
            .header("X-Device-Id", "device-a")
            .body(Body::empty())
            .unwrap();
        let (_s, _h, body) = send(app, request).await;
        assert_eq!(body["processed"], 1);
        assert_eq!(body["requeued"], 1);
        assert_eq!(body["applied"], 0);
    }
}
