//! Connection factory.
//!
//! # Responsibilities
//! - Own the shared address cache and run its periodic clear
//! - Own the scheme registry (`dns` and `passthrough` by default)
//! - Turn target strings into [`ClientConnection`]s
//!
//! Must be created inside a Tokio runtime; the cache janitor is spawned on
//! construction.

use std::sync::{Arc, Mutex};

use crate::client::connection::ClientConnection;
use crate::client::state::StateSink;
use crate::config::{validate_config, ConnectorConfig};
use crate::error::ConnectError;
use crate::lifecycle::Shutdown;
use crate::resilience::{BreakerSettings, CircuitBreaker, RetryPolicy};
use crate::resolver::lookup::AuthorityLookup;
use crate::resolver::{
    AddressCache, AddressSink, CacheJanitor, DnsResolverBuilder, LookupBackend,
    PassthroughResolverBuilder, ResolverBuilder, ResolverRegistry, SystemLookup, Target,
};

/// Creates client connections that share one address cache.
pub struct ConnectionFactory {
    config: ConnectorConfig,
    cache: Arc<AddressCache>,
    registry: ResolverRegistry,
    janitor: Mutex<Option<CacheJanitor>>,
    shutdown: Shutdown,
}

impl ConnectionFactory {
    /// Build a factory resolving through the system resolver.
    ///
    /// The configuration is validated first; nothing is spawned if it is invalid.
    pub fn new(config: ConnectorConfig) -> Result<Self, ConnectError> {
        validate_config(&config).map_err(ConnectError::Invalid)?;

        let cache = Arc::new(AddressCache::new());
        let shutdown = Shutdown::new();
        let janitor = cache.spawn_janitor(config.resolver.cache_clear_interval(), shutdown.token());

        let factory = Self {
            config,
            cache,
            registry: ResolverRegistry::new(),
            janitor: Mutex::new(Some(janitor)),
            shutdown,
        };
        factory.registry.register(Arc::new(PassthroughResolverBuilder));
        factory.register_dns(Arc::new(SystemLookup::new()), None);

        tracing::info!(
            schemes = ?factory.registry.schemes(),
            cache_clear_interval_ms = factory.config.resolver.cache_clear_interval_ms,
            "Connection factory ready"
        );
        Ok(factory)
    }

    /// Resolve hostnames through `backend` instead of the system resolver.
    pub fn with_lookup(self, backend: Arc<dyn LookupBackend>) -> Self {
        self.register_dns(backend, None);
        self
    }

    /// Resolve hostnames through `backend`, and targets naming a nameserver
    /// authority through the backend `authority_lookup` returns for it.
    pub fn with_authority_lookup(
        self,
        backend: Arc<dyn LookupBackend>,
        authority_lookup: AuthorityLookup,
    ) -> Self {
        self.register_dns(backend, Some(authority_lookup));
        self
    }

    fn register_dns(&self, backend: Arc<dyn LookupBackend>, authority_lookup: Option<AuthorityLookup>) {
        let mut builder = DnsResolverBuilder::new(
            Arc::clone(&self.cache),
            backend,
            self.config.resolver.lookup_timeout(),
        )
        .with_shutdown(self.shutdown.token());
        if let Some(factory) = authority_lookup {
            builder = builder.with_authority_lookup(factory);
        }
        self.registry.register(Arc::new(builder));
    }

    /// Register an additional scheme, replacing any builder for the same scheme.
    pub fn register(&self, builder: Arc<dyn ResolverBuilder>) {
        self.registry.register(builder);
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AddressCache> {
        &self.cache
    }

    /// Parse `target`, start its resolver and return the connection.
    ///
    /// Parse errors and unknown schemes fail here, before any background
    /// work is started.
    pub fn connect(&self, target: &str) -> Result<ClientConnection, ConnectError> {
        let parsed = Target::parse(
            target,
            &self.config.resolver.default_port,
            &self.config.resolver.dns_server_port,
        )?;
        let builder = self
            .registry
            .get(&parsed.scheme)
            .ok_or_else(|| ConnectError::UnknownScheme(parsed.scheme.clone()))?;
        let retry_policy = RetryPolicy::from_config(&self.config.retries)?;

        let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::from_config(
            target,
            &self.config.breaker,
        )));

        let sink = Arc::new(StateSink::new());
        let updates = sink.subscribe();
        let resolver = builder.build(&parsed, Arc::clone(&sink) as Arc<dyn AddressSink>)?;

        tracing::info!(
            target = %target,
            scheme = %parsed.scheme,
            endpoint = %parsed.endpoint,
            "Client connection created"
        );

        Ok(ClientConnection::new(
            parsed,
            resolver,
            sink,
            updates,
            breaker,
            retry_policy,
            self.config.retries.jitter_ratio,
            self.config.timeouts.call_timeout(),
            self.shutdown.token(),
        ))
    }

    /// Stop the cache janitor, every DNS watch loop and in-flight calls on
    /// every connection.
    ///
    /// [`ClientConnection::close`] remains the way to wait until a single
    /// connection can no longer publish.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let janitor = self
            .janitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(janitor) = janitor {
            janitor.stop().await;
        }
        tracing::info!("Connection factory shut down");
    }
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("schemes", &self.registry.schemes())
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}
