//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, outcomes are counted
//! - Open: upstream assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls decide recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip predicate holds after a failure
//!                (default: requests >= 100 and failure ratio >= 0.6)
//! Open → Half-Open: after open_duration
//! Half-Open → Closed: max_half_open_requests consecutive successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - One breaker per logical client connection, shared by all its calls
//! - Counts live in generations; a state change or the end of a rolling
//!   interval starts a new generation, and late outcomes from an older
//!   generation are ignored
//! - The lock is never held across the protected call
//! - The trip predicate is checked only when a failure is recorded, so the
//!   same outcomes can trip or not depending on order: 70 failures after 30
//!   successes trip, 30 successes after 70 failures leave the circuit closed
//!   until the next failure
//! - State change notifications are side effects only

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::{CallError, OutcomeKind};
use crate::observability::metrics;

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Open => "open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request and outcome counters of the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Counts::default();
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            f64::from(self.total_failures) / f64::from(self.requests)
        }
    }
}

/// Decides whether the circuit should open after a failure in the Closed state.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Decides whether an outcome counts as success (`None` = the call returned `Ok`).
pub type SuccessClassifier = Arc<dyn Fn(Option<OutcomeKind>) -> bool + Send + Sync>;

/// Diagnostic hook: `(breaker name, from, to)`.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Trip when at least `min_requests` were seen and the failure ratio reached `failure_ratio`.
pub fn ratio_trip(min_requests: u32, failure_ratio: f64) -> TripPredicate {
    Arc::new(move |counts: &Counts| {
        counts.requests >= min_requests && counts.failure_ratio() >= failure_ratio
    })
}

/// `Ok` and success-shaped errors are successes; everything else is a failure.
pub fn default_is_successful(kind: Option<OutcomeKind>) -> bool {
    matches!(kind, None | Some(OutcomeKind::SuccessShaped))
}

/// Breaker settings.
#[derive(Clone)]
pub struct BreakerSettings {
    pub name: String,
    /// Trial calls allowed while Half-Open; also the successes needed to close.
    pub max_half_open_requests: u32,
    /// Rolling window after which Closed-state counts reset. Zero never resets.
    pub interval: Duration,
    /// Time spent Open before trial calls are allowed.
    pub open_duration: Duration,
    pub ready_to_trip: TripPredicate,
    pub is_successful: SuccessClassifier,
    pub on_state_change: Option<StateChangeHook>,
}

impl BreakerSettings {
    /// Settings with the default policy: 100 requests, 0.6 failure ratio,
    /// 60s open duration, counts reset every two open durations.
    pub fn new(name: impl Into<String>) -> Self {
        let open_duration = Duration::from_secs(60);
        Self {
            name: name.into(),
            max_half_open_requests: 10,
            interval: open_duration * 2,
            open_duration,
            ready_to_trip: ratio_trip(100, 0.6),
            is_successful: Arc::new(default_is_successful),
            on_state_change: None,
        }
    }

    pub fn from_config(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            max_half_open_requests: config.max_half_open_requests,
            interval: config.interval(),
            open_duration: config.open_duration(),
            ready_to_trip: ratio_trip(config.min_requests, config.failure_ratio),
            is_successful: Arc::new(default_is_successful),
            on_state_change: None,
        }
    }

    pub fn with_ready_to_trip(mut self, predicate: TripPredicate) -> Self {
        self.ready_to_trip = predicate;
        self
    }

    pub fn with_success_classifier(mut self, classifier: SuccessClassifier) -> Self {
        self.is_successful = classifier;
        self
    }

    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }
}

impl fmt::Debug for BreakerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("name", &self.name)
            .field("max_half_open_requests", &self.max_half_open_requests)
            .field("interval", &self.interval)
            .field("open_duration", &self.open_duration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    /// End of the rolling interval (Closed) or of the open period (Open).
    expiry: Option<Instant>,
}

type Transition = (CircuitState, CircuitState);

/// Circuit breaker shared by all calls on one client connection.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let max_half_open_requests = settings.max_half_open_requests.max(1);
        let expiry = (!settings.interval.is_zero()).then(|| Instant::now() + settings.interval);
        Self {
            settings: BreakerSettings {
                max_half_open_requests,
                ..settings
            },
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Current state, applying any time-based transition that is due.
    pub fn state(&self) -> CircuitState {
        let mut transitions = Vec::new();
        let state = {
            let mut inner = self.lock();
            self.current_state(&mut inner, Instant::now(), &mut transitions).0
        };
        self.notify(&transitions);
        state
    }

    /// Counters of the current generation.
    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    /// Run `call` under breaker protection.
    ///
    /// Fails with [`CallError::CircuitOpen`] (Open) or [`CallError::TooManyRequests`]
    /// (Half-Open, trial budget used) without invoking `call`. Otherwise returns
    /// the call's own result after recording its outcome. A call whose future is
    /// dropped before completion counts as a failure.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let generation = self.before_request()?;
        let mut guard = OutcomeGuard {
            breaker: self,
            generation,
            armed: true,
        };

        let result = call().await;

        guard.armed = false;
        let kind = result.as_ref().err().map(CallError::kind);
        self.after_request(generation, (self.settings.is_successful)(kind));
        result
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn before_request(&self) -> Result<u64, CallError> {
        let mut transitions = Vec::new();
        let admitted = {
            let mut inner = self.lock();
            let (state, generation) = self.current_state(&mut inner, Instant::now(), &mut transitions);
            match state {
                CircuitState::Open => Err(CallError::CircuitOpen {
                    name: self.settings.name.clone(),
                }),
                CircuitState::HalfOpen if inner.counts.requests >= self.settings.max_half_open_requests => {
                    Err(CallError::TooManyRequests {
                        name: self.settings.name.clone(),
                    })
                }
                _ => {
                    inner.counts.on_request();
                    Ok(generation)
                }
            }
        };
        self.notify(&transitions);

        if admitted.is_err() {
            metrics::record_breaker_rejection(&self.settings.name);
        }
        admitted
    }

    fn after_request(&self, generation: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.lock();
            let now = Instant::now();
            let (state, current) = self.current_state(&mut inner, now, &mut transitions);
            if generation != current {
                // Outcome belongs to an older generation; only time-based
                // transitions applied above remain to be reported.
            } else if success {
                inner.counts.on_success();
                if state == CircuitState::HalfOpen
                    && inner.counts.consecutive_successes >= self.settings.max_half_open_requests
                {
                    self.set_state(&mut inner, CircuitState::Closed, now, &mut transitions);
                }
            } else {
                match state {
                    CircuitState::Closed => {
                        inner.counts.on_failure();
                        if (self.settings.ready_to_trip)(&inner.counts) {
                            tracing::debug!(
                                breaker = %self.settings.name,
                                requests = inner.counts.requests,
                                failures = inner.counts.total_failures,
                                "Trip condition met"
                            );
                            self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                        }
                    }
                    CircuitState::HalfOpen => {
                        self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                    }
                    CircuitState::Open => {}
                }
            }
        }
        self.notify(&transitions);
    }

    fn current_state(
        &self,
        inner: &mut BreakerInner,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> (CircuitState, u64) {
        match inner.state {
            CircuitState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now, transitions);
                }
            }
            CircuitState::HalfOpen => {}
        }
        (inner.state, inner.generation)
    }

    fn set_state(
        &self,
        inner: &mut BreakerInner,
        state: CircuitState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        if inner.state == state {
            return;
        }
        let from = inner.state;
        inner.state = state;
        self.new_generation(inner, now);
        transitions.push((from, state));
    }

    fn new_generation(&self, inner: &mut BreakerInner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts.clear();
        inner.expiry = match inner.state {
            CircuitState::Closed => (!self.settings.interval.is_zero()).then(|| now + self.settings.interval),
            CircuitState::Open => Some(now + self.settings.open_duration),
            CircuitState::HalfOpen => None,
        };
    }

    fn notify(&self, transitions: &[Transition]) {
        for &(from, to) in transitions {
            tracing::info!(breaker = %self.settings.name, from = %from, to = %to, "Circuit breaker state changed");
            metrics::record_breaker_transition(&self.settings.name, from.as_str(), to.as_str());
            if let Some(hook) = &self.settings.on_state_change {
                hook(&self.settings.name, from, to);
            }
        }
    }
}

/// Records a failure if the protected call is dropped before completing.
struct OutcomeGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    armed: bool,
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.after_request(self.generation, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    fn settings(max_half_open: u32) -> BreakerSettings {
        BreakerSettings {
            max_half_open_requests: max_half_open,
            interval: Duration::ZERO,
            open_duration: Duration::from_secs(10),
            ..BreakerSettings::new("test")
        }
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), CallError> {
        cb.execute(|| async { Ok(()) }).await
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), CallError> {
        cb.execute(|| async { Err(CallError::Failed("boom".into())) }).await
    }

    async fn feed(cb: &CircuitBreaker, successes: usize, failures: usize) {
        for _ in 0..successes {
            let _ = succeed(cb).await;
        }
        for _ in 0..failures {
            let _ = fail(cb).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_at_seventy_percent_failures() {
        let cb = CircuitBreaker::new(settings(10));
        feed(&cb, 30, 70).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trip_is_checked_on_failures_only() {
        let cb = CircuitBreaker::new(settings(10));
        feed(&cb, 0, 70).await;
        feed(&cb, 30, 0).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().requests, 100);

        // The next failure sees 71/101 and trips.
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_at_fifty_percent_failures() {
        let cb = CircuitBreaker::new(settings(10));
        feed(&cb, 50, 50).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().requests, 100);
        assert_eq!(cb.counts().total_failures, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_minimum_requests_never_trips() {
        let cb = CircuitBreaker::new(settings(10));
        feed(&cb, 0, 99).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_fails_fast_without_invoking_call() {
        let cb = CircuitBreaker::new(settings(10));
        feed(&cb, 0, 100).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result = cb
            .execute(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(result, Err(CallError::CircuitOpen { name: "test".into() }));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_trial_successes() {
        let cb = CircuitBreaker::new(settings(3));
        feed(&cb, 0, 100).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(settings(3));
        feed(&cb, 0, 100).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        succeed(&cb).await.unwrap();
        assert!(fail(&cb).await.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(succeed(&cb).await, Err(CallError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_max_trials() {
        let cb = Arc::new(CircuitBreaker::new(settings(3)));
        feed(&cb, 0, 100).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let gate = Arc::new(Semaphore::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let mut trials = Vec::new();
        for _ in 0..3 {
            let cb = cb.clone();
            let gate = gate.clone();
            let started = started.clone();
            trials.push(tokio::spawn(async move {
                cb.execute(|| async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let _permit = gate.acquire().await.map_err(|e| CallError::Failed(e.to_string()))?;
                    Ok(())
                })
                .await
            }));
        }
        while started.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(succeed(&cb).await, Err(CallError::TooManyRequests { .. })));

        gate.add_permits(3);
        for trial in trials {
            trial.await.unwrap().unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolling_interval_resets_counts() {
        let cb = CircuitBreaker::new(BreakerSettings {
            interval: Duration::from_secs(20),
            ..settings(10)
        });
        feed(&cb, 0, 99).await;
        assert_eq!(cb.counts().requests, 99);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().requests, 0);

        feed(&cb, 0, 1).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_shaped_errors_count_as_success() {
        let cb = CircuitBreaker::new(settings(10));
        for _ in 0..100 {
            let _: Result<(), _> = cb
                .execute(|| async { Err(CallError::SuccessShaped("OK: HTTP status code 200".into())) })
                .await;
        }
        assert_eq!(cb.counts().total_successes, 100);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_hook_observes_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let cb = CircuitBreaker::new(settings(1).with_state_change_hook(Arc::new(move |name: &str, from: CircuitState, to: CircuitState| {
            hook_seen.lock().unwrap().push((name.to_string(), from, to));
        })));

        feed(&cb, 0, 100).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        succeed(&cb).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("test".to_string(), CircuitState::Closed, CircuitState::Open),
                ("test".to_string(), CircuitState::Open, CircuitState::HalfOpen),
                ("test".to_string(), CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_still_reports_due_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        let cb = CircuitBreaker::new(settings(1).with_state_change_hook(Arc::new(move |_: &str, from: CircuitState, to: CircuitState| {
            hook_seen.lock().unwrap().push((from, to));
        })));

        let gate = Semaphore::new(0);
        let slow = cb.execute(|| async {
            let _permit = gate.acquire().await;
            Ok(())
        });
        let trip_then_release = async {
            feed(&cb, 0, 100).await;
            tokio::time::advance(Duration::from_secs(11)).await;
            gate.add_permits(1);
        };
        let (slow_result, _) = tokio::join!(slow, trip_then_release);
        slow_result.unwrap();

        assert_eq!(
            seen.lock().unwrap().clone(),
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
            ]
        );
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_counts_as_failure() {
        let cb = CircuitBreaker::new(settings(1));
        feed(&cb, 0, 100).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let pending = cb.execute(|| std::future::pending::<Result<(), CallError>>());
        let _ = tokio::time::timeout(Duration::from_millis(1), pending).await;

        assert_eq!(cb.state(), CircuitState::Open);
    }
}
