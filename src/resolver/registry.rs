//! Resolver builders and the per-scheme registry.
//!
//! # Responsibilities
//! - Map a target scheme to the builder that knows how to resolve it
//! - Short-circuit IP-literal targets before any watcher is created
//!
//! # Design Decisions
//! - The registry is an explicit object, not a process global, so tests and
//!   independent clients never see each other's registrations
//! - Registering a scheme twice replaces the earlier builder

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectError;
use crate::observability::metrics;
use crate::resolver::address::Address;
use crate::resolver::cache::AddressCache;
use crate::resolver::lookup::{AuthorityLookup, LookupBackend};
use crate::resolver::target::Target;
use crate::resolver::watcher::{DnsResolver, InertResolver};
use crate::resolver::{AddressSink, Resolver};

/// Scheme served by [`DnsResolverBuilder`].
pub const DNS_SCHEME: &str = "dns";

/// Scheme served by [`PassthroughResolverBuilder`].
pub const PASSTHROUGH_SCHEME: &str = "passthrough";

/// Factory of resolvers for one scheme.
pub trait ResolverBuilder: Send + Sync {
    fn scheme(&self) -> &str;

    /// Create a resolver for `target` that publishes into `sink`.
    fn build(&self, target: &Target, sink: Arc<dyn AddressSink>) -> Result<Box<dyn Resolver>, ConnectError>;
}

/// Builds DNS watchers over a shared address cache.
pub struct DnsResolverBuilder {
    cache: Arc<AddressCache>,
    backend: Arc<dyn LookupBackend>,
    authority_lookup: Option<AuthorityLookup>,
    lookup_timeout: Duration,
    shutdown: Option<CancellationToken>,
}

impl DnsResolverBuilder {
    pub fn new(cache: Arc<AddressCache>, backend: Arc<dyn LookupBackend>, lookup_timeout: Duration) -> Self {
        Self {
            cache,
            backend,
            authority_lookup: None,
            lookup_timeout,
            shutdown: None,
        }
    }

    /// Stop every resolver built from here once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Use `factory` to obtain a backend for targets that name a nameserver.
    pub fn with_authority_lookup(mut self, factory: AuthorityLookup) -> Self {
        self.authority_lookup = Some(factory);
        self
    }

    fn backend_for(&self, target: &Target) -> Arc<dyn LookupBackend> {
        match (&target.authority, &self.authority_lookup) {
            (Some(authority), Some(factory)) => factory(authority),
            (Some(authority), None) => {
                tracing::debug!(
                    authority = %authority,
                    "No authority lookup configured, using default backend"
                );
                Arc::clone(&self.backend)
            }
            (None, _) => Arc::clone(&self.backend),
        }
    }
}

impl ResolverBuilder for DnsResolverBuilder {
    fn scheme(&self) -> &str {
        DNS_SCHEME
    }

    fn build(&self, target: &Target, sink: Arc<dyn AddressSink>) -> Result<Box<dyn Resolver>, ConnectError> {
        if let Some(address) = target.literal_address() {
            tracing::debug!(address = %address, "Target is an IP literal, skipping resolution");
            metrics::record_resolution("literal");
            sink.update_state(vec![address]);
            return Ok(Box::new(InertResolver));
        }

        let backend = self.backend_for(target);
        let cancel = self
            .shutdown
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let resolver = DnsResolver::start_with_token(
            target,
            Arc::clone(&self.cache),
            backend,
            sink,
            self.lookup_timeout,
            cancel,
        );
        tracing::info!(
            resolver_id = %resolver.id(),
            host = %target.host,
            port = %target.port,
            "DNS resolver started"
        );
        Ok(Box::new(resolver))
    }
}

/// Publishes the endpoint verbatim, once.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughResolverBuilder;

impl ResolverBuilder for PassthroughResolverBuilder {
    fn scheme(&self) -> &str {
        PASSTHROUGH_SCHEME
    }

    fn build(&self, target: &Target, sink: Arc<dyn AddressSink>) -> Result<Box<dyn Resolver>, ConnectError> {
        metrics::record_resolution("passthrough");
        sink.update_state(vec![Address::verbatim(target.endpoint.clone())]);
        Ok(Box::new(InertResolver))
    }
}

/// Scheme → builder lookup table.
#[derive(Default)]
pub struct ResolverRegistry {
    builders: DashMap<String, Arc<dyn ResolverBuilder>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` under its scheme, replacing any previous one.
    pub fn register(&self, builder: Arc<dyn ResolverBuilder>) {
        let scheme = builder.scheme().to_ascii_lowercase();
        if self.builders.insert(scheme.clone(), builder).is_some() {
            tracing::debug!(scheme = %scheme, "Replaced resolver builder");
        }
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.builders
            .get(&scheme.to_ascii_lowercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.builders.iter().map(|e| e.key().clone()).collect();
        schemes.sort();
        schemes
    }
}
