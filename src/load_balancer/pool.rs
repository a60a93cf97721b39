//! Backend pool abstraction.
//!
//! # Responsibilities
//! - Define the capability set every selection strategy provides
//! - Map a configured strategy name to a concrete pool

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::load_balancer::{
    backend::Backend,
    least_conn::LeastConnectionsPool,
    round_robin::RoundRobinPool,
};

/// An ordered, append-only set of backends plus a selection strategy.
///
/// The load balancer only ever talks to this trait, so strategies can be
/// swapped at startup without touching call sites.
pub trait ServerPool: Send + Sync + fmt::Debug {
    /// Append a backend. No deduplication.
    fn add_backend(&self, backend: Arc<Backend>);

    /// Snapshot of all backends in configuration order.
    fn backends(&self) -> Vec<Arc<Backend>>;

    fn pool_size(&self) -> usize;

    /// Pick an alive backend, or `None` if the pool is empty or every backend is dead.
    fn next_valid_peer(&self) -> Option<Arc<Backend>>;
}

/// Selection strategy name, as written in config and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    #[serde(alias = "least-connection")]
    LeastConnections,
}

impl Strategy {
    /// Create an empty pool for this strategy.
    pub fn new_pool(self) -> Arc<dyn ServerPool> {
        match self {
            Strategy::RoundRobin => Arc::new(RoundRobinPool::new()),
            Strategy::LeastConnections => Arc::new(LeastConnectionsPool::new()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::LeastConnections => "least-connections",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy {0:?} (expected round-robin or least-connections)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "roundrobin" => Ok(Strategy::RoundRobin),
            "least-connections" | "least-connection" | "leastconn" => Ok(Strategy::LeastConnections),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}
