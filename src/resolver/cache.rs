//! Shared address cache with periodic bulk clearing.
//!
//! # Responsibilities
//! - Map a resolver's cache key to its most recently resolved addresses
//! - Wipe every entry on a fixed interval from a single janitor task
//!
//! # Design Decisions
//! - One lock for get/put/clear; all operations are O(1) apart from the clear
//! - No per-entry expiry: staleness is bounded by the clear interval only
//! - The janitor is owned explicitly (start/stop), never started implicitly

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::observability::metrics;
use crate::resolver::address::Address;

/// Default rate-limit window between bulk clears.
pub const DEFAULT_CLEAR_INTERVAL: Duration = Duration::from_secs(30);

/// Process-wide cache of resolved addresses.
#[derive(Debug, Default)]
pub struct AddressCache {
    entries: Mutex<HashMap<String, Vec<Address>>>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Address>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Most recent addresses stored under `key`.
    pub fn get(&self, key: &str) -> Option<Vec<Address>> {
        self.lock().get(key).cloned()
    }

    /// Store `addresses` under `key`, replacing any previous value.
    pub fn put(&self, key: impl Into<String>, addresses: Vec<Address>) {
        let mut entries = self.lock();
        entries.insert(key.into(), addresses);
        metrics::record_cache_size(entries.len());
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut entries = self.lock();
        let removed = entries.len();
        entries.clear();
        metrics::record_cache_clear(removed);
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Start the periodic clear task.
    ///
    /// The first clear happens one full `interval` after the call.
    ///
    /// # Panics
    /// If `interval` is zero. Configured intervals are rejected earlier by
    /// `validate_config`.
    pub fn spawn_janitor(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> CacheJanitor {
        let cache = Arc::clone(self);
        let token = cancel.clone();
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "Address cache janitor started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Address cache janitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.clear_all();
                        if removed > 0 {
                            tracing::debug!(removed, "Cleared address cache");
                        }
                    }
                }
            }
        });

        CacheJanitor { cancel, handle }
    }
}

/// Handle to the running janitor task.
#[derive(Debug)]
pub struct CacheJanitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CacheJanitor {
    /// Cancel the janitor and wait until it has exited.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Address cache janitor panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<Address> {
        list.iter().map(|a| Address::verbatim(*a)).collect()
    }

    #[test]
    fn test_put_get_overwrite() {
        let cache = AddressCache::new();
        assert!(cache.get("svc").is_none());

        cache.put("svc", addrs(&["10.0.0.1:443"]));
        assert_eq!(cache.get("svc").unwrap(), addrs(&["10.0.0.1:443"]));

        cache.put("svc", addrs(&["10.0.0.2:443", "10.0.0.3:443"]));
        assert_eq!(cache.get("svc").unwrap(), addrs(&["10.0.0.2:443", "10.0.0.3:443"]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_all_forgets_every_key() {
        let cache = AddressCache::new();
        cache.put("a", addrs(&["10.0.0.1:1"]));
        cache.put("b", addrs(&["10.0.0.2:2"]));
        cache.put("c", Vec::new());

        assert_eq!(cache.clear_all(), 3);
        assert!(cache.is_empty());
        for key in ["a", "b", "c"] {
            assert!(cache.get(key).is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_clears_on_interval() {
        let cache = Arc::new(AddressCache::new());
        let janitor = cache.spawn_janitor(Duration::from_secs(30), CancellationToken::new());

        cache.put("svc", addrs(&["10.0.0.1:443"]));
        time::sleep(Duration::from_secs(29)).await;
        assert!(cache.get("svc").is_some());

        time::sleep(Duration::from_secs(2)).await;
        assert!(cache.get("svc").is_none());

        janitor.stop().await;
        cache.put("svc", addrs(&["10.0.0.1:443"]));
        time::sleep(Duration::from_secs(120)).await;
        assert!(cache.get("svc").is_some());
    }
}
