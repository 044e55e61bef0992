//! Resilient client connections: name resolution with a shared address cache,
//! exponential backoff, circuit breaking and retries.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod resolver;

pub use client::{ClientConnection, ConnectionFactory};
pub use config::ConnectorConfig;
pub use error::{CallError, ConnectError, OutcomeKind, ParseError};
pub use lifecycle::Shutdown;
pub use resolver::{Address, Target};
