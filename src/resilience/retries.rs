//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed call is retried, and after which delay
//! - Execute a retry session with backoff sleeps between attempts
//!
//! # Design Decisions
//! - Terminal outcomes (transport closing, success-shaped, circuit open) stop
//!   the session immediately; hammering a tripped breaker is pointless
//! - The policy only looks at the error it is given, never at breaker counts
//! - One policy (and backoff generator) per retry session
//! - An optional attempt ceiling turns into a distinct "retries exhausted" error

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{BackoffError, CallError};
use crate::observability::metrics;
use crate::resilience::backoff::{apply_jitter, ExponentialBackoff};

/// Why a retry session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The error is classified as terminal.
    Terminal,
    /// The attempt ceiling was reached.
    Exhausted,
    /// The backoff reached its cap and the policy stops there.
    CapReached,
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay, then try again.
    Retry(Duration),
    Stop(StopReason),
}

/// Retry policy for a single session.
#[derive(Debug)]
pub struct RetryPolicy {
    backoff: ExponentialBackoff,
    /// Total attempts allowed, including the first. Zero means unbounded.
    max_attempts: u32,
    stop_at_cap: bool,
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Result<Self, BackoffError> {
        Ok(Self {
            backoff: ExponentialBackoff::new(base, max)?,
            max_attempts: 0,
            stop_at_cap: false,
        })
    }

    pub fn from_config(config: &RetryConfig) -> Result<Self, BackoffError> {
        Ok(Self::new(config.base_delay(), config.max_delay())?
            .with_max_attempts(config.max_attempts)
            .with_stop_at_cap(config.stop_at_cap))
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_stop_at_cap(mut self, stop_at_cap: bool) -> Self {
        self.stop_at_cap = stop_at_cap;
        self
    }

    /// An identical policy with its backoff sequence reset, for a new session.
    pub fn fresh(&self) -> Self {
        Self {
            backoff: self.backoff.restart(),
            max_attempts: self.max_attempts,
            stop_at_cap: self.stop_at_cap,
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed with `last_error`.
    pub fn should_retry(&self, attempt: u32, last_error: &CallError) -> RetryDecision {
        if last_error.kind().is_terminal() {
            return RetryDecision::Stop(StopReason::Terminal);
        }
        if self.max_attempts > 0 && attempt >= self.max_attempts {
            return RetryDecision::Stop(StopReason::Exhausted);
        }

        let delay = self.backoff.next_delay();
        if self.stop_at_cap && delay >= self.backoff.max() {
            return RetryDecision::Stop(StopReason::CapReached);
        }
        RetryDecision::Retry(delay)
    }
}

/// Run `operation` until it succeeds or `policy` stops the session.
///
/// Terminal errors are returned unchanged. Hitting the attempt ceiling wraps
/// the last error in [`CallError::RetriesExhausted`]. Cancellation during an
/// attempt or a backoff sleep returns [`CallError::Cancelled`].
pub async fn retry_call<T, F, Fut>(
    policy: &RetryPolicy,
    jitter_ratio: f64,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CallError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match policy.should_retry(attempt, &err) {
            RetryDecision::Retry(delay) => {
                let delay = apply_jitter(delay, jitter_ratio);
                tracing::debug!(
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after backoff"
                );
                metrics::record_retry();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CallError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::Stop(StopReason::Exhausted) => {
                tracing::warn!(attempts = attempt, error = %err, "Retries exhausted");
                return Err(CallError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            RetryDecision::Stop(reason) => {
                tracing::debug!(attempt, ?reason, error = %err, "Not retrying");
                return Err(err);
            }
        }
    }
}
