//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → balancer.rs (LoadBalancer::serve)
//!     → pool.rs (ServerPool::next_valid_peer), one of:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest in-flight requests)
//!     → backend.rs (hold a connection slot, forward)
//!     → on forwarding error: mark dead, retry once, else 503
//! ```
//!
//! # Design Decisions
//! - The balancer depends only on the `ServerPool` trait
//! - Dead backends are excluded from selection
//! - Only the health checker brings a dead backend back

pub mod backend;
pub mod balancer;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::Backend;
pub use balancer::LoadBalancer;
pub use pool::{ServerPool, Strategy};
