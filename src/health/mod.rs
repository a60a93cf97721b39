//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → One probe task per backend
//!     → Backend::set_alive(result)
//!
//! Request-path failure (load_balancer/balancer.rs):
//!     Forwarding error
//!     → Backend::set_alive(false) immediately
//! ```
//!
//! # Liveness
//! ```text
//! ALIVE → DEAD:  forwarding failure, or failed probe
//! DEAD  → ALIVE: successful probe only
//! ```
//!
//! A successful request never revives a backend: dead backends are not
//! selected, so only the probe can observe recovery.

pub mod active;

pub use active::{HealthChecker, Prober};
