//! Single-host reverse proxying.
//!
//! # Responsibilities
//! - Rewrite the request URI onto one backend's base URL
//! - Rewrite `Host`, append `X-Forwarded-For`, strip hop-by-hop headers
//! - Send the request with the shared upstream client and stream the response back
//!
//! Upstream status codes are passed through untouched. Only transport failures
//! (connect refused, reset, timeout) come back as [`ProxyError`].

use std::fmt;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, Uri};
use futures_util::future::{BoxFuture, FutureExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::http::request::ForwardRequest;

/// Shared upstream HTTP client type.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Failure to complete a forwarded request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream uri {0:?}")]
    InvalidUri(String),

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream unreachable: {0}")]
    Unreachable(String),
}

/// Something that can deliver a request to one upstream target.
///
/// [`ReverseProxy`] is the production implementation; tests substitute their own.
pub trait Forwarder: Send + Sync + fmt::Debug {
    fn forward<'a>(&'a self, request: &'a ForwardRequest) -> BoxFuture<'a, Result<Response<Body>, ProxyError>>;
}

/// Build the upstream client shared by every backend.
pub fn upstream_client(connect_timeout: Duration) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Forwards requests to a single target URL.
#[derive(Clone)]
pub struct ReverseProxy {
    target: Url,
    client: UpstreamClient,
    timeout: Duration,
}

impl fmt::Debug for ReverseProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverseProxy")
            .field("target", &self.target.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReverseProxy {
    pub fn new(target: Url, client: UpstreamClient, timeout: Duration) -> Self {
        Self { target, client, timeout }
    }

    fn build_request(&self, request: &ForwardRequest) -> Result<Request<Body>, ProxyError> {
        let uri = upstream_uri(&self.target, &request.uri)?;

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);
        if let Some(authority) = uri.authority() {
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                headers.insert(header::HOST, host);
            }
        }
        if let Some(addr) = request.remote_addr {
            append_forwarded_for(&mut headers, &addr.ip().to_string());
        }

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(uri);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }

        Ok(builder.body(Body::from(request.body.clone()))?)
    }

    async fn send(&self, request: &ForwardRequest) -> Result<Response<Body>, ProxyError> {
        let upstream = self.build_request(request)?;

        let response: Response<hyper::body::Incoming> = tokio::time::timeout(self.timeout, self.client.request(upstream))
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))??;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

impl Forwarder for ReverseProxy {
    fn forward<'a>(&'a self, request: &'a ForwardRequest) -> BoxFuture<'a, Result<Response<Body>, ProxyError>> {
        self.send(request).boxed()
    }
}

/// Compute the upstream URI: target scheme and authority, target path joined
/// with the request path, both query strings merged.
pub fn upstream_uri(target: &Url, incoming: &Uri) -> Result<Uri, ProxyError> {
    let path = join_path(target.path(), incoming.path());
    let query = match (target.query().filter(|q| !q.is_empty()), incoming.query().filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };

    let host = target.host_str().unwrap_or_default();
    let authority = match target.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let raw = match query {
        Some(q) => format!("{}://{}{}?{}", target.scheme(), authority, path, q),
        None => format!("{}://{}{}", target.scheme(), authority, path),
    };
    raw.parse::<Uri>().map_err(|_| ProxyError::InvalidUri(raw))
}

/// Join two path segments with exactly one slash between them.
fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client_ip),
        None => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", v);
    }
}
