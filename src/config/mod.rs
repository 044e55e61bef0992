//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ConnectorConfig (validated, immutable)
//!     → handed to ConnectionFactory, which derives breaker/retry/timeout settings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BreakerConfig, ConnectorConfig, LogFormat, ObservabilityConfig, ResolverConfig, RetryConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
