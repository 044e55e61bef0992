//! Name resolution subsystem.
//!
//! # Data Flow
//! ```text
//! target string
//!     → target.rs (scheme, authority, host, port)
//!     → registry.rs (pick builder by scheme)
//!     → IP literal / passthrough: publish once, inert resolver
//!     → otherwise watcher.rs (one background loop per connection):
//!         resolve_now signal (coalesced)
//!         → cache.rs hit? publish cached addresses
//!         → miss: lookup.rs backend → validate IPs → cache.rs put → publish
//! ```
//!
//! # Design Decisions
//! - The cache and registry are explicit objects owned by the connection factory
//! - Resolution failures never reach the call path; they publish an empty set
//! - `close()` waits for the loop, so nothing is published after it returns

pub mod address;
pub mod cache;
pub mod lookup;
pub mod registry;
pub mod target;
pub mod watcher;

use async_trait::async_trait;

pub use address::Address;
pub use cache::{AddressCache, CacheJanitor};
pub use lookup::{LookupBackend, SystemLookup};
pub use registry::{DnsResolverBuilder, PassthroughResolverBuilder, ResolverBuilder, ResolverRegistry};
pub use target::{parse_host_port, Target};
pub use watcher::{DnsResolver, InertResolver};

/// Receiver of resolved address sets, typically the owning connection.
///
/// An empty list means "currently unresolvable" and must not be treated as fatal.
pub trait AddressSink: Send + Sync {
    fn update_state(&self, addresses: Vec<Address>);
}

/// A running resolver attached to one connection.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Request an immediate re-resolution. Never blocks; bursts coalesce.
    fn resolve_now(&self);

    /// Stop resolving. Returns once no further updates can be published.
    async fn close(&self);
}
