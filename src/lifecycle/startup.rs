//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn configured backend URLs into a server pool
//! - Refuse to start with zero usable backends
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - All backends share one upstream client (one connection pool per host)

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::LbConfig;
use crate::config::validation::{parse_backend_url, ValidationError};
use crate::http::proxy::{upstream_client, ReverseProxy};
use crate::load_balancer::{Backend, ServerPool};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid backend: {0}")]
    InvalidBackend(#[from] ValidationError),

    #[error("server pool has no usable backends")]
    NoBackends,
}

/// Build the pool for the configured strategy, one backend per URL in order.
pub fn build_pool(config: &LbConfig) -> Result<Arc<dyn ServerPool>, StartupError> {
    let pool = config.strategy.new_pool();
    let client = upstream_client(Duration::from_secs(config.timeouts.connect_secs));
    let request_timeout = Duration::from_secs(config.timeouts.request_secs);

    for raw in &config.backends {
        let url = parse_backend_url(raw)?;
        let proxy = ReverseProxy::new(url.clone(), client.clone(), request_timeout);
        tracing::info!(backend = %url, "Backend registered");
        pool.add_backend(Arc::new(Backend::new(url, Arc::new(proxy))));
    }

    if pool.pool_size() == 0 {
        return Err(StartupError::NoBackends);
    }

    tracing::info!(
        strategy = %config.strategy,
        backends = pool.pool_size(),
        "Server pool ready"
    );
    Ok(pool)
}
