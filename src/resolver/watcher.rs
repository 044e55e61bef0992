//! Background watch loop for non-literal targets.
//!
//! # States
//! ```text
//! Created → Watching → (Resolving ⇄ Watching) → Closed
//! ```
//!
//! # Design Decisions
//! - Exactly one task per resolver, started on construction
//! - `resolve_now` stores at most one pending permit, so bursts of requests
//!   between two drains collapse into a single resolution cycle
//! - Lookups race the cancellation token; `close` never waits on network I/O
//! - A failed lookup publishes an empty set and leaves the cache untouched

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::LookupError;
use crate::observability::metrics;
use crate::resolver::address::Address;
use crate::resolver::cache::AddressCache;
use crate::resolver::lookup::LookupBackend;
use crate::resolver::target::Target;
use crate::resolver::{AddressSink, Resolver};

/// Resolver that never re-resolves (IP literals, passthrough targets).
#[derive(Debug, Default, Clone, Copy)]
pub struct InertResolver;

#[async_trait]
impl Resolver for InertResolver {
    fn resolve_now(&self) {}

    async fn close(&self) {}
}

/// Watches the name resolution of a hostname target.
#[derive(Debug)]
pub struct DnsResolver {
    id: Uuid,
    resolve_now: Arc<Notify>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DnsResolver {
    /// Start the watch loop and trigger the initial resolution.
    pub fn start(
        target: &Target,
        cache: Arc<AddressCache>,
        backend: Arc<dyn LookupBackend>,
        sink: Arc<dyn AddressSink>,
        lookup_timeout: Duration,
    ) -> Self {
        Self::start_with_token(target, cache, backend, sink, lookup_timeout, CancellationToken::new())
    }

    /// Like [`DnsResolver::start`], but the loop also stops when `cancel` is
    /// cancelled. Pass a child token to tie the resolver to a wider shutdown.
    pub fn start_with_token(
        target: &Target,
        cache: Arc<AddressCache>,
        backend: Arc<dyn LookupBackend>,
        sink: Arc<dyn AddressSink>,
        lookup_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let id = Uuid::new_v4();
        let resolve_now = Arc::new(Notify::new());

        let watch = WatchLoop {
            host: target.host.clone(),
            port: target.port.clone(),
            cache_key: target.endpoint.clone(),
            cache,
            backend,
            sink,
            lookup_timeout,
            resolve_now: Arc::clone(&resolve_now),
            cancel: cancel.clone(),
        };

        let span = tracing::info_span!("dns_resolver", resolver_id = %id, endpoint = %target.endpoint);
        let handle = tokio::spawn(watch.run().instrument(span));

        let resolver = Self {
            id,
            resolve_now,
            cancel,
            handle: Mutex::new(Some(handle)),
        };
        resolver.resolve_now();
        resolver
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    fn resolve_now(&self) {
        self.resolve_now.notify_one();
    }

    async fn close(&self) {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(resolver_id = %self.id, error = %e, "Resolver task panicked");
            }
            tracing::debug!(resolver_id = %self.id, "Resolver closed");
        }
    }
}

impl Drop for DnsResolver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct WatchLoop {
    host: String,
    port: String,
    cache_key: String,
    cache: Arc<AddressCache>,
    backend: Arc<dyn LookupBackend>,
    sink: Arc<dyn AddressSink>,
    lookup_timeout: Duration,
    resolve_now: Arc<Notify>,
    cancel: CancellationToken,
}

impl WatchLoop {
    async fn run(self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = self.resolve_now.notified() => {}
            }

            let addresses = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                addresses = self.resolve() => addresses,
            };

            tracing::debug!(count = addresses.len(), "Publishing resolved addresses");
            self.sink.update_state(addresses);
        }
        tracing::debug!("Watch loop exited");
    }

    /// One resolution cycle: cache first, live lookup on miss.
    async fn resolve(&self) -> Vec<Address> {
        if let Some(cached) = self.cache.get(&self.cache_key) {
            if !cached.is_empty() {
                metrics::record_resolution("cache");
                return cached;
            }
        }

        match self.lookup_host().await {
            Ok(addresses) => {
                metrics::record_resolution("lookup");
                self.cache.put(self.cache_key.clone(), addresses.clone());
                addresses
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "DNS A record lookup failed");
                metrics::record_lookup_failure();
                Vec::new()
            }
        }
    }

    async fn lookup_host(&self) -> Result<Vec<Address>, LookupError> {
        let ips = time::timeout(self.lookup_timeout, self.backend.lookup_host(&self.host))
            .await
            .map_err(|_| LookupError::Timeout(self.lookup_timeout))??;

        let mut addresses = Vec::with_capacity(ips.len());
        for ip in ips {
            match Address::from_ip(&ip, &self.port) {
                Some(address) => addresses.push(address),
                None => {
                    tracing::warn!(host = %self.host, entry = %ip, "Dropping unparseable IP from lookup result");
                    metrics::record_dropped_address();
                }
            }
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct FixedLookup {
        ips: Vec<String>,
        calls: AtomicUsize,
    }

    impl FixedLookup {
        fn new(ips: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                ips: ips.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LookupBackend for FixedLookup {
        async fn lookup_host(&self, _host: &str) -> Result<Vec<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.ips.clone())
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl LookupBackend for FailingLookup {
        async fn lookup_host(&self, host: &str) -> Result<Vec<String>, LookupError> {
            Err(LookupError::Backend(format!("no such host: {}", host)))
        }
    }

    struct HangingLookup;

    #[async_trait]
    impl LookupBackend for HangingLookup {
        async fn lookup_host(&self, _host: &str) -> Result<Vec<String>, LookupError> {
            std::future::pending().await
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<Vec<Address>>);

    impl AddressSink for ChannelSink {
        fn update_state(&self, addresses: Vec<Address>) {
            let _ = self.0.send(addresses);
        }
    }

    fn sink() -> (Arc<dyn AddressSink>, mpsc::UnboundedReceiver<Vec<Address>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink(tx)), rx)
    }

    fn target(raw: &str) -> Target {
        Target::parse(raw, "443", "53").unwrap()
    }

    async fn next_update(rx: &mut mpsc::UnboundedReceiver<Vec<Address>>) -> Vec<String> {
        let update = time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("sink closed");
        update.into_iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_initial_resolution_filters_invalid_entries() {
        let cache = Arc::new(AddressCache::new());
        let backend = FixedLookup::new(&["10.0.0.1", "bogus", "2001:db8::2"]);
        let (sink, mut rx) = sink();

        let resolver = DnsResolver::start(&target("svc.internal:8080"), cache.clone(), backend.clone(), sink, Duration::from_secs(1));

        assert_eq!(next_update(&mut rx).await, vec!["10.0.0.1:8080", "[2001:db8::2]:8080"]);
        assert_eq!(cache.get("svc.internal:8080").unwrap().len(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        resolver.close().await;
    }

    #[tokio::test]
    async fn test_cache_hit_skips_lookup() {
        let cache = Arc::new(AddressCache::new());
        cache.put("svc.internal", vec![Address::verbatim("10.9.9.9:443")]);
        let backend = FixedLookup::new(&["10.0.0.1"]);
        let (sink, mut rx) = sink();

        let resolver = DnsResolver::start(&target("svc.internal"), cache, backend.clone(), sink, Duration::from_secs(1));

        assert_eq!(next_update(&mut rx).await, vec!["10.9.9.9:443"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        resolver.close().await;
    }

    #[tokio::test]
    async fn test_lookup_failure_publishes_empty_set() {
        let cache = Arc::new(AddressCache::new());
        let (sink, mut rx) = sink();

        let resolver = DnsResolver::start(&target("missing.internal"), cache.clone(), Arc::new(FailingLookup), sink, Duration::from_secs(1));

        assert!(next_update(&mut rx).await.is_empty());
        assert!(cache.get("missing.internal").is_none());

        // The loop survives and keeps serving signals.
        resolver.resolve_now();
        assert!(next_update(&mut rx).await.is_empty());

        resolver.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_publishes_empty_set() {
        let (sink, mut rx) = sink();
        let resolver = DnsResolver::start(
            &target("slow.internal"),
            Arc::new(AddressCache::new()),
            Arc::new(HangingLookup),
            sink,
            Duration::from_millis(500),
        );

        assert!(next_update(&mut rx).await.is_empty());
        resolver.close().await;
    }

    #[tokio::test]
    async fn test_close_abandons_inflight_lookup() {
        let (sink, mut rx) = sink();
        let resolver = DnsResolver::start(
            &target("slow.internal"),
            Arc::new(AddressCache::new()),
            Arc::new(HangingLookup),
            sink,
            Duration::from_secs(3600),
        );

        time::timeout(Duration::from_secs(5), resolver.close())
            .await
            .expect("close blocked on in-flight lookup");

        // Sender dropped with the loop, nothing was published.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_no_publish_after_close() {
        let cache = Arc::new(AddressCache::new());
        let (sink, mut rx) = sink();
        let resolver = DnsResolver::start(&target("svc.internal"), cache, FixedLookup::new(&["10.0.0.1"]), sink, Duration::from_secs(1));

        next_update(&mut rx).await;
        resolver.close().await;
        resolver.resolve_now();

        assert!(rx.recv().await.is_none());
    }
}
