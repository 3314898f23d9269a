//! Route handlers for the sync API.
//!
//! Every success response goes through [`envelope`], which wraps the
//! handler's payload in the uniform `{success: true, ..., serverTimestamp}`
//! shape. Failures short-circuit through `ApiError`'s `IntoResponse`.

pub mod dependencies;
pub mod sync;

use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

/// Wraps a payload in the uniform success envelope.
pub fn envelope(payload: impl Serialize) -> Json<Value> {
    let mut map = match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        // Non-object payloads don't occur; an empty envelope beats a panic.
        _ => Map::new(),
    };

    map.insert("success".to_string(), Value::Bool(true));
    map.insert(
        "serverTimestamp".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );

    Json(Value::Object(map))
}
