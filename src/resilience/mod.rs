//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call on a client connection:
//!     → retries.rs (fresh policy per call session)
//!         → circuit_breaker.rs (fail fast when open, record outcome)
//!             → timeouts.rs (per-attempt deadline)
//!                 → the call itself
//!     → On failure: retries.rs classifies the error,
//!       backoff.rs yields the next delay, sleep, try again
//! ```
//!
//! # Design Decisions
//! - Retry policy and breaker are decoupled; they only share the outcome kind
//! - Circuit-open rejections end the retry session
//! - Backoff delays never decrease and never exceed the configured cap

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitState, Counts};
pub use retries::{retry_call, RetryDecision, RetryPolicy, StopReason};
pub use timeouts::with_timeout;
