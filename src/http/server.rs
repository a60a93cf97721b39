//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler on every path
//! - Wire up middleware (request ID, tracing, timeout)
//! - Buffer request bodies and hand them to the load balancer
//! - Run the health checker alongside the server
//! - Graceful shutdown with a bounded drain

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use http_body_util::LengthLimitError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::LbConfig;
use crate::health::HealthChecker;
use crate::http::request::{ForwardRequest, UuidRequestId};
use crate::http::response::{bad_request, payload_too_large};
use crate::lifecycle::{build_pool, StartupError};
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<LoadBalancer>,
    pub max_body_bytes: usize,
}

/// HTTP front end of the load balancer.
pub struct HttpServer {
    router: Router,
    config: LbConfig,
    balancer: Arc<LoadBalancer>,
}

impl HttpServer {
    /// Build the server pool from configuration and the router around it.
    pub fn new(config: LbConfig) -> Result<Self, StartupError> {
        let pool = build_pool(&config)?;
        Ok(Self::with_balancer(config, Arc::new(LoadBalancer::new(pool))))
    }

    /// Use an already assembled load balancer.
    pub fn with_balancer(config: LbConfig, balancer: Arc<LoadBalancer>) -> Self {
        let state = AppState {
            balancer: balancer.clone(),
            max_body_bytes: config.limits.max_body_bytes,
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            balancer,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &LbConfig, state: AppState) -> Router {
        // Inbound deadline covers both attempts of a retried request.
        let request_timeout = Duration::from_secs(config.timeouts.request_secs.saturating_mul(2));

        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Run until `shutdown` fires, then drain for at most the grace period.
    ///
    /// When the grace period runs out the accept loop is aborted and `run`
    /// returns. Connections still being served are left to finish or to be
    /// dropped with the runtime.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = %self.config.strategy,
            "Load balancer started"
        );

        if self.config.health_check.enabled {
            let checker = HealthChecker::new(self.balancer.pool().clone(), &self.config.health_check);
            tokio::spawn(checker.run(shutdown.resubscribe()));
        }

        let mut drain_signal = shutdown.resubscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut serving = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await
        });

        tokio::select! {
            joined = &mut serving => {
                return joined.map_err(std::io::Error::other)?;
            }
            _ = drain_signal.recv() => {}
        }

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        tracing::info!(grace_secs = grace.as_secs(), "Draining in-flight requests");

        match tokio::time::timeout(grace, &mut serving).await {
            Ok(joined) => joined.map_err(std::io::Error::other)??,
            Err(_) => {
                tracing::warn!("Grace period elapsed, no longer waiting for in-flight requests");
                serving.abort();
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Buffers the request and lets the load balancer pick a backend.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(remote = %remote, path = %parts.uri.path(), error = %e, "Rejecting request body");
            let response = reject_body(&e);
            metrics::record_request(&method, response.status().as_u16(), start_time);
            return response;
        }
    };

    let response = state
        .balancer
        .serve(ForwardRequest::from_parts(parts, body, remote))
        .await;

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

/// 413 when the body went over the limit, 400 for any other read failure.
fn reject_body(error: &axum::Error) -> Response {
    let over_limit = std::iter::successors(Some(error as &(dyn std::error::Error + 'static)), |e| e.source())
        .any(|e| e.is::<LengthLimitError>());
    if over_limit {
        payload_too_large()
    } else {
        bad_request()
    }
}
