//! Client connections with resolution and call protection wired together.
//!
//! # Data Flow
//! ```text
//! ConnectionFactory::connect(target)
//!     → Target::parse
//!     → ResolverRegistry (builder by scheme)
//!     → resolver publishes into StateSink (watch channel)
//!     → ClientConnection
//!
//! ClientConnection::call(op)
//!     → retry_call (fresh policy per call)
//!         → CircuitBreaker::execute (shared per connection)
//!             → with_timeout(op())
//!     → transport closing? resolve_now()
//! ```
//!
//! # Design Decisions
//! - The factory owns the shared address cache, its janitor and the registry
//! - One breaker per connection, named after the target string
//! - Retry and breaker settings are validated at connect time

pub mod connection;
pub mod factory;
pub mod state;

pub use connection::ClientConnection;
pub use factory::ConnectionFactory;
pub use state::StateSink;
