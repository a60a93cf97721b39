//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI flags / LB_* environment
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → LbConfig (validated, immutable)
//!     → values passed into subsystem constructors
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the backend list is fixed for the process lifetime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::LbConfig;
pub use schema::ListenerConfig;
pub use schema::HealthCheckConfig;
pub use schema::TimeoutConfig;
pub use schema::ObservabilityConfig;
pub use schema::{LogFormat, ProbeKind};
pub use validation::{validate_config, ValidationError};
