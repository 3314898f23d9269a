//! # Device Identity Extraction
//!
//! Every sync and dependency route requires the `X-Device-Id` header. The
//! extractor rejects requests without it before the handler runs, producing
//! the standard 400 `MissingDeviceId` envelope.
//!
//! Device identity is a capability contract: the id is a stable UUID minted
//! by each installation. The server trusts it for routing (self-echo
//! suppression, cursor rows); stronger authentication is outside this
//! service's scope.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// Header carrying the caller's device identity.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// The caller's device id, extracted from `X-Device-Id`.
#[derive(Debug, Clone)]
pub struct DeviceId(pub String);

impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(DEVICE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::MissingDeviceId)?;

        Ok(DeviceId(value.to_string()))
    }
}
