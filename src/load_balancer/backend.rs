//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream target
//! - Track in-flight connections (for Least Connections LB)
//! - Track liveness (alive/dead)
//! - Forward requests through its bound [`Forwarder`]

use std::ops::Deref;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use parking_lot::RwLock;
use url::Url;

use crate::http::proxy::{Forwarder, ProxyError};
use crate::http::request::ForwardRequest;

#[derive(Debug)]
struct BackendState {
    alive: bool,
    connections: usize,
}

/// A single upstream server.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    /// Liveness and in-flight count share one lock.
    state: RwLock<BackendState>,
    proxy: Arc<dyn Forwarder>,
}

impl Backend {
    /// Create a new backend. Backends start out alive.
    pub fn new(url: Url, proxy: Arc<dyn Forwarder>) -> Self {
        Self {
            url,
            state: RwLock::new(BackendState {
                alive: true,
                connections: 0,
            }),
            proxy,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` of the target, with the scheme's default port filled in.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.state.write().alive = alive;
    }

    pub fn is_alive(&self) -> bool {
        self.state.read().alive
    }

    /// Current number of in-flight requests.
    pub fn connections(&self) -> usize {
        self.state.read().connections
    }

    fn inc_connections(&self) {
        self.state.write().connections += 1;
    }

    fn dec_connections(&self) {
        let mut state = self.state.write();
        state.connections = state.connections.saturating_sub(1);
    }

    /// Create a guard that holds one in-flight slot until dropped.
    pub fn connection_guard(self: &Arc<Self>) -> BackendConnectionGuard {
        self.inc_connections();
        BackendConnectionGuard {
            backend: self.clone(),
        }
    }

    /// Forward a request to this backend.
    ///
    /// The connection count is held for the whole call and released on every
    /// exit path, including panics and the future being dropped mid-flight.
    pub async fn serve(self: &Arc<Self>, request: &ForwardRequest) -> Result<Response<Body>, ProxyError> {
        let _guard = self.connection_guard();
        self.proxy.forward(request).await
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
    }
}
