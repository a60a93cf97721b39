//! Mock forwarders and builders shared by the load balancer unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Response, Uri};
use futures_util::future::{BoxFuture, FutureExt};
use url::Url;

use crate::http::proxy::{Forwarder, ProxyError};
use crate::http::request::ForwardRequest;
use crate::load_balancer::backend::Backend;

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Ok,
    Fail,
    Panic,
}

/// Programmable forwarder that records how it was used.
#[derive(Debug)]
pub struct MockForwarder {
    behavior: Behavior,
    delay: Option<Duration>,
    /// Number of `forward` calls.
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    /// Highest number of concurrent `forward` calls seen.
    pub max_in_flight: AtomicUsize,
}

impl MockForwarder {
    fn with(behavior: Behavior, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::with(Behavior::Ok, None)
    }

    pub fn failing() -> Arc<Self> {
        Self::with(Behavior::Fail, None)
    }

    pub fn panicking() -> Arc<Self> {
        Self::with(Behavior::Panic, None)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::with(Behavior::Ok, Some(delay))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Forwarder for MockForwarder {
    fn forward<'a>(&'a self, _request: &'a ForwardRequest) -> BoxFuture<'a, Result<Response<Body>, ProxyError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.behavior {
                Behavior::Ok => Ok(Response::new(Body::from("ok"))),
                Behavior::Fail => Err(ProxyError::Unreachable("connection refused".into())),
                Behavior::Panic => panic!("forwarder blew up"),
            }
        }
        .boxed()
    }
}

pub fn backend_with(url: &str, forwarder: Arc<MockForwarder>) -> Arc<Backend> {
    Arc::new(Backend::new(Url::parse(url).unwrap(), forwarder))
}

/// A pool-ready backend whose forwarder always succeeds.
pub fn ok_backend(port: u16) -> Arc<Backend> {
    backend_with(&format!("http://127.0.0.1:{}", port), MockForwarder::ok())
}

pub fn request(path: &str) -> ForwardRequest {
    let uri: Uri = path.parse().unwrap();
    ForwardRequest::new(Method::GET, uri, HeaderMap::new(), Bytes::new())
}
