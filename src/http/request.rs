//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Buffer the inbound request so it can be re-sent on retry
//! - Carry the per-request retry marker
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The retry marker can only go from unset to set, by consuming the request

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates a UUID v4 `x-request-id` for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// A fully buffered inbound request, ready to be forwarded (possibly twice).
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
    retried: bool,
}

impl ForwardRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            remote_addr: None,
            retried: false,
        }
    }

    /// Build from the parts of an inbound request and its collected body.
    pub fn from_parts(parts: axum::http::request::Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            remote_addr: Some(remote_addr),
            retried: false,
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Whether this request is already the retry of a failed attempt.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// Mark the request as a retry.
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }

    /// The request ID assigned at the edge, or `"-"`.
    pub fn request_id(&self) -> &str {
        self.headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_marker_is_set_once() {
        let req = ForwardRequest::new(Method::GET, Uri::from_static("/a"), HeaderMap::new(), Bytes::new());
        assert!(!req.is_retry());

        let retried = req.into_retry();
        assert!(retried.is_retry());
        assert!(retried.clone().into_retry().is_retry());
    }

    #[test]
    fn test_request_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        let req = ForwardRequest::new(Method::GET, Uri::from_static("/"), headers, Bytes::new());
        assert_eq!(req.request_id(), "abc-123");

        let bare = ForwardRequest::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), Bytes::new());
        assert_eq!(bare.request_id(), "-");
    }

    #[test]
    fn test_uuid_request_id() {
        let request = Request::new(());
        let id = UuidRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }
}
