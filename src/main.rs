//! relay-lb: HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     LOAD BALANCER                    │
//!                      │                                                      │
//!   Client Request     │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│ LoadBalancer │───▶│ ServerPool  │  │
//!                      │  │ server  │    │   (retry)    │    │ rr / leastc │  │
//!                      │  └─────────┘    └──────┬───────┘    └──────┬──────┘  │
//!                      │                        │ on error: mark     │         │
//!                      │                        │ dead, retry once   ▼         │
//!   Client Response    │                 ┌──────┴───────┐    ┌─────────────┐  │
//!   ◀──────────────────┼─────────────────│   response   │◀───│   Backend   │◀─┼── Upstream
//!                      │                 └──────────────┘    └──────▲──────┘  │
//!                      │                                           │ alive?   │
//!                      │                                    ┌──────┴──────┐   │
//!                      │                                    │   health    │   │
//!                      │                                    │   checker   │   │
//!                      │                                    └─────────────┘   │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_lb::config::{parse_config, validate_config, ConfigError, LbConfig};
use relay_lb::lifecycle::{signals, Shutdown};
use relay_lb::observability::{logging, metrics};
use relay_lb::{HttpServer, Strategy};

#[derive(Parser, Debug)]
#[command(name = "relay-lb", version, about = "HTTP load balancer with health checks and retry")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "LB_CONFIG")]
    config: Option<PathBuf>,

    /// Listening port (overrides the file).
    #[arg(short, long, env = "LB_PORT")]
    port: Option<u16>,

    /// Selection strategy: round-robin or least-connections.
    #[arg(short, long, env = "LB_STRATEGY")]
    strategy: Option<Strategy>,

    /// Comma-separated backend URLs (overrides the file).
    #[arg(short, long, env = "LB_BACKENDS", value_delimiter = ',')]
    backends: Vec<String>,
}

impl Cli {
    /// File values first, then flag/env overrides, validated once at the end.
    fn into_config(self) -> Result<LbConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => parse_config(path)?,
            None => LbConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if !self.backends.is_empty() {
            config.backends = self.backends;
        }

        validate_config(&config)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability);
    tracing::info!("relay-lb v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        strategy = %config.strategy,
        backends = config.backends.len(),
        health_interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        match signals::wait_for_signal().await {
            Ok(()) => shutdown.trigger(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for shutdown signals");
                // Keep the sender alive; dropping it would read as a shutdown.
                std::future::pending::<()>().await;
            }
        }
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
