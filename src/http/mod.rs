//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body buffering)
//!     → request.rs (ForwardRequest with retry marker)
//!     → [load balancer picks a backend]
//!     → proxy.rs (rewrite URI and headers, send upstream)
//!     → response.rs (503/413 on failure)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use proxy::{Forwarder, ProxyError, ReverseProxy};
pub use request::{ForwardRequest, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
