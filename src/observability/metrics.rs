//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, status
//! - `lb_request_duration_seconds` (histogram): latency distribution
//! - `lb_retries_total` (counter): retries issued after a forwarding failure
//! - `lb_no_backend_total` (counter): requests answered 503 with no peer
//! - `lb_backend_alive` (gauge): 1=alive, 0=dead, per backend
//!
//! Recording is a no-op until a recorder is installed, so the load balancer
//! core can call these unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("lb_requests_total", "method" => method.to_string(), "status" => status.clone()).increment(1);
    histogram!("lb_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry() {
    counter!("lb_retries_total").increment(1);
}

pub fn record_no_backend() {
    counter!("lb_no_backend_total").increment(1);
}

pub fn record_backend_health(backend: &str, alive: bool) {
    gauge!("lb_backend_alive", "backend" => backend.to_string()).set(if alive { 1.0 } else { 0.0 });
}
