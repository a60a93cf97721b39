//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe backends
//! - Update backend liveness based on results

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use futures_util::future::join_all;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{HealthCheckConfig, ProbeKind};
use crate::http::proxy::{upstream_client, UpstreamClient};
use crate::load_balancer::{Backend, ServerPool};
use crate::observability::metrics;

/// Probes one backend's reachability.
#[derive(Clone)]
pub struct Prober {
    kind: ProbeKind,
    path: String,
    timeout: Duration,
    client: UpstreamClient,
}

impl Prober {
    pub fn new(config: &HealthCheckConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            kind: config.probe,
            path: config.path.clone(),
            timeout,
            client: upstream_client(timeout),
        }
    }

    /// True if the backend answered within the timeout.
    pub async fn probe(&self, backend: &Backend) -> bool {
        match self.kind {
            ProbeKind::Tcp => self.probe_tcp(backend).await,
            ProbeKind::Http => self.probe_http(backend).await,
        }
    }

    async fn probe_tcp(&self, backend: &Backend) -> bool {
        let authority = backend.authority();
        match time::timeout(self.timeout, TcpStream::connect(authority.as_str())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(backend = %authority, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(backend = %authority, "Health check failed: timeout");
                false
            }
        }
    }

    async fn probe_http(&self, backend: &Backend) -> bool {
        let uri_string = format!("http://{}{}", backend.authority(), self.path);

        let request = match Request::builder()
            .method("GET")
            .uri(&uri_string)
            .header("user-agent", "relay-lb-health-check")
            .body(Body::empty()) {
                Ok(req) => req,
                Err(e) => {
                    tracing::error!(uri = %uri_string, "Failed to build health check request: {}", e);
                    return false;
                }
            };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(uri = %uri_string, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(uri = %uri_string, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(uri = %uri_string, "Health check failed: timeout");
                false
            }
        }
    }

    /// Probe and record the result on the backend.
    pub async fn update(&self, backend: &Backend) -> bool {
        let alive = self.probe(backend).await;
        let was_alive = backend.is_alive();
        backend.set_alive(alive);

        match (was_alive, alive) {
            (false, true) => tracing::info!(backend = %backend.url(), "Backend recovered"),
            (true, false) => tracing::warn!(backend = %backend.url(), "Backend marked dead"),
            _ => tracing::debug!(backend = %backend.url(), alive, "Health check complete"),
        }
        metrics::record_backend_health(backend.url().as_str(), alive);
        alive
    }
}

/// Background loop that keeps every backend's liveness current.
pub struct HealthChecker {
    pool: Arc<dyn ServerPool>,
    interval: Duration,
    prober: Prober,
}

impl HealthChecker {
    pub fn new(pool: Arc<dyn ServerPool>, config: &HealthCheckConfig) -> Self {
        Self {
            pool,
            interval: Duration::from_secs(config.interval_secs),
            prober: Prober::new(config),
        }
    }

    /// Tick every interval until shutdown. The first tick fires one interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            backends = self.pool.pool_size(),
            "Health checker starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Starting health check");
                    self.spawn_probes();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Closing health check");
                    break;
                }
            }
        }
    }

    /// One fire-and-forget task per backend; a slow probe never delays the next tick.
    fn spawn_probes(&self) {
        for backend in self.pool.backends() {
            let prober = self.prober.clone();
            tokio::spawn(async move {
                prober.update(&backend).await;
            });
        }
    }

    /// Probe every backend concurrently and wait for all results.
    pub async fn check_once(&self) {
        let backends = self.pool.backends();
        join_all(backends.iter().map(|b| self.prober.update(b))).await;
    }
}
