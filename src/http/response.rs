//! Response helpers.
//!
//! Failure responses are plain text. Upstream responses are streamed back
//! as-is apart from hop-by-hop header removal (see `proxy.rs`).

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

/// Body sent with every 503.
pub const UNAVAILABLE_BODY: &str = "Service not available";

/// No alive backend, or the retry is spent.
pub fn service_unavailable() -> Response<Body> {
    (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_BODY).into_response()
}

pub fn payload_too_large() -> Response<Body> {
    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
}

/// The request body could not be read to the end.
pub fn bad_request() -> Response<Body> {
    (StatusCode::BAD_REQUEST, "Failed to read request body").into_response()
}
