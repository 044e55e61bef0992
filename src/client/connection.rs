//! A resolved, breaker-protected connection to one target.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::client::state::StateSink;
use crate::error::CallError;
use crate::resilience::{retry_call, with_timeout, CircuitBreaker, RetryPolicy};
use crate::resolver::{Address, Resolver, Target};

/// Handle returned by [`ConnectionFactory::connect`](crate::client::ConnectionFactory::connect).
pub struct ClientConnection {
    target: Target,
    resolver: Box<dyn Resolver>,
    sink: Arc<StateSink>,
    updates: Mutex<watch::Receiver<Vec<Address>>>,
    breaker: Arc<CircuitBreaker>,
    retry_policy: RetryPolicy,
    jitter_ratio: f64,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl ClientConnection {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        target: Target,
        resolver: Box<dyn Resolver>,
        sink: Arc<StateSink>,
        updates: watch::Receiver<Vec<Address>>,
        breaker: Arc<CircuitBreaker>,
        retry_policy: RetryPolicy,
        jitter_ratio: f64,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            target,
            resolver,
            sink,
            updates: Mutex::new(updates),
            breaker,
            retry_policy,
            jitter_ratio,
            call_timeout,
            cancel,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Most recently published address set.
    pub fn addresses(&self) -> Vec<Address> {
        self.sink.current()
    }

    /// Receiver notified on every later publish.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Address>> {
        self.sink.subscribe()
    }

    /// Wait for the next publish this connection has not yet observed.
    ///
    /// The first call returns the initial resolution, even if it completed
    /// before the call was made.
    pub async fn wait_for_update(&self) -> Vec<Address> {
        let mut rx = self.updates.lock().await;
        if rx.changed().await.is_err() {
            tracing::debug!(endpoint = %self.target.endpoint, "Address publisher dropped");
        }
        let addresses = rx.borrow_and_update().clone();
        addresses
    }

    /// Ask the resolver to re-resolve. Never blocks.
    pub fn resolve_now(&self) {
        self.resolver.resolve_now();
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` with retries, circuit breaking and a per-attempt timeout.
    ///
    /// Each attempt goes through the connection's breaker; the attempt's future
    /// is bounded by the configured call timeout. A transport-closing failure
    /// also asks the resolver for fresh addresses.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let policy = self.retry_policy.fresh();
        let this = self;

        retry_call(&policy, self.jitter_ratio, &self.cancel, || {
            let attempt = op();
            async move {
                let result = this
                    .breaker
                    .execute(move || with_timeout(this.call_timeout, attempt))
                    .await;
                if let Err(CallError::TransportClosing(reason)) = &result {
                    tracing::debug!(
                        endpoint = %this.target.endpoint,
                        reason = %reason,
                        "Transport closing, requesting re-resolution"
                    );
                    this.resolver.resolve_now();
                }
                result
            }
        })
        .await
    }

    /// Stop resolution and cancel in-flight calls.
    ///
    /// Returns once the resolver can no longer publish. Safe to call twice.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.resolver.close().await;
        tracing::debug!(endpoint = %self.target.endpoint, "Connection closed");
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("target", &self.target)
            .field("breaker", &self.breaker.name())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}
