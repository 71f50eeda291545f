use axum::http::{HeaderMap, Method};

use super::headers::is_multipart;
use crate::error::GatewayError;

/// Methods whose inbound body must be present and well-formed before forwarding.
pub fn requires_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Reject write requests with a missing or malformed body.
///
/// Runs before any backend call. Multipart uploads are opaque and only
/// checked for presence.
pub fn validate_body(method: &Method, headers: &HeaderMap, body: &[u8]) -> Result<(), GatewayError> {
    if !requires_body(method) {
        return Ok(());
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::BodyRequired);
    }

    if is_multipart(headers) {
        return Ok(());
    }

    serde_json::from_slice::<serde_json::Value>(body)
        .map(|_| ())
        .map_err(|e| GatewayError::invalid_json(e.to_string()))
}
