//! HTTP load balancer with round-robin and least-connections selection,
//! background health checks, and a single retry on upstream failure.

pub mod config;
pub mod http;
pub mod health;
pub mod load_balancer;
pub mod lifecycle;
pub mod observability;

pub use config::LbConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use load_balancer::{LoadBalancer, ServerPool, Strategy};
