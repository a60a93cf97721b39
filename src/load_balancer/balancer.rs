//! Request dispatch and retry coordination.
//!
//! # Responsibilities
//! - Ask the pool for a peer and forward through it
//! - On forwarding failure: mark the peer dead, retry once on a fresh peer
//! - Answer 503 when no peer is alive or the single retry is spent

use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use futures_util::future::{BoxFuture, FutureExt};

use crate::http::proxy::ProxyError;
use crate::http::request::ForwardRequest;
use crate::http::response::service_unavailable;
use crate::load_balancer::{Backend, ServerPool};
use crate::observability::metrics;

/// Entry point that turns a buffered request into an upstream response.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pool: Arc<dyn ServerPool>,
}

impl LoadBalancer {
    pub fn new(pool: Arc<dyn ServerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn ServerPool> {
        &self.pool
    }

    /// Serve one request. Never fails: errors become a 503 response.
    pub fn serve(&self, request: ForwardRequest) -> BoxFuture<'_, Response<Body>> {
        async move {
            let Some(peer) = self.pool.next_valid_peer() else {
                tracing::warn!(
                    request_id = %request.request_id(),
                    path = %request.path(),
                    retry = request.is_retry(),
                    pool_size = self.pool.pool_size(),
                    "No alive backend available"
                );
                metrics::record_no_backend();
                return service_unavailable();
            };

            tracing::debug!(
                request_id = %request.request_id(),
                backend = %peer.url(),
                method = %request.method,
                path = %request.path(),
                "Forwarding request"
            );

            match peer.serve(&request).await {
                Ok(response) => response,
                Err(e) => self.on_upstream_error(&peer, request, e).await,
            }
        }
        .boxed()
    }

    /// Error callback for a failed forward.
    async fn on_upstream_error(&self, peer: &Arc<Backend>, request: ForwardRequest, error: ProxyError) -> Response<Body> {
        tracing::error!(
            request_id = %request.request_id(),
            host = %peer.authority(),
            error = %error,
            "Error handling the request"
        );
        peer.set_alive(false);
        metrics::record_backend_health(peer.url().as_str(), false);

        let address = request
            .remote_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());

        if request.is_retry() {
            tracing::info!(
                request_id = %request.request_id(),
                address = %address,
                path = %request.path(),
                "Max retry attempts reached, terminating"
            );
            return service_unavailable();
        }

        tracing::info!(
            request_id = %request.request_id(),
            address = %address,
            path = %request.path(),
            retry = true,
            "Attempting retry"
        );
        metrics::record_retry();
        self.serve(request.into_retry()).await
    }
}
