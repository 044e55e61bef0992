//! Exponential backoff with a capped maximum.
//!
//! Given `(100ms, 1s)` the sequence is `100ms, 200ms, 400ms, 800ms, 1s, 1s, …`.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::error::BackoffError;

/// Delay for a given attempt index: `base * 2^attempt`, capped at `max`.
///
/// Overflow of the shift or the multiplication saturates to `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = 1u32
        .checked_shl(attempt)
        .and_then(|multiplier| base.checked_mul(multiplier));

    match delay {
        Some(delay) if delay <= max => delay,
        _ => max,
    }
}

/// Add up to `ratio * delay` of random jitter.
pub fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 || delay.is_zero() {
        return delay;
    }
    let extra = delay.as_secs_f64() * ratio.min(1.0) * rand::thread_rng().gen_range(0.0..1.0);
    delay + Duration::from_secs_f64(extra)
}

/// Stateful delay generator for one retry session.
///
/// Not meant to be shared across unrelated call sequences; the attempt index
/// belongs to a single failure sequence.
#[derive(Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    attempt: Mutex<u32>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Result<Self, BackoffError> {
        if base.is_zero() {
            return Err(BackoffError::ZeroBase);
        }
        if max.is_zero() {
            return Err(BackoffError::ZeroMax);
        }
        if max < base {
            return Err(BackoffError::MaxBelowBase { base, max });
        }
        Ok(Self {
            base,
            max,
            attempt: Mutex::new(0),
        })
    }

    /// Next delay in the sequence.
    ///
    /// The attempt index stops advancing once the cap is reached.
    pub fn next_delay(&self) -> Duration {
        let mut attempt = self.attempt.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let delay = calculate_backoff(*attempt, self.base, self.max);
        if delay < self.max {
            *attempt += 1;
        }
        delay
    }

    /// A new generator with the same bounds, starting from `base` again.
    pub fn restart(&self) -> Self {
        Self {
            base: self.base,
            max: self.max,
            attempt: Mutex::new(0),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}
