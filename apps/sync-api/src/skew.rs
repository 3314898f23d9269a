//! # Clock Skew Middleware
//!
//! Intercepts every request: measures the caller's `X-Client-Timestamp`
//! against the server clock, stamps every response with the authoritative
//! `X-Server-Timestamp`, and adds `X-Clock-Skew-Seconds` when the skew
//! threshold is exceeded.
//!
//! Skew never fails a request; it is surfaced as headers so warnings don't
//! disturb the JSON envelope.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

use meridian_sync::ClockSkewGuard;

/// Request header: the caller's wall-clock time.
pub const CLIENT_TIMESTAMP_HEADER: &str = "x-client-timestamp";

/// Response header: authoritative server time, always present.
pub const SERVER_TIMESTAMP_HEADER: &str = "x-server-timestamp";

/// Response header: signed skew in seconds, present past the threshold.
pub const CLOCK_SKEW_HEADER: &str = "x-clock-skew-seconds";

/// Middleware stamping server time and surfacing clock skew.
pub async fn stamp(request: Request, next: Next) -> Response {
    let client_time = request
        .headers()
        .get(CLIENT_TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut response = next.run(request).await;

    let now = Utc::now();
    if let Ok(value) = HeaderValue::from_str(&now.to_rfc3339()) {
        response.headers_mut().insert(SERVER_TIMESTAMP_HEADER, value);
    }

    if let Some(client_time) = client_time {
        if let Some(warning) = ClockSkewGuard::default().measure(client_time, now) {
            if let Ok(value) = HeaderValue::from_str(&warning.skew_secs.to_string()) {
                response.headers_mut().insert(CLOCK_SKEW_HEADER, value);
            }
        }
    }

    response
}
