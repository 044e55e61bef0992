//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the connector.
//! All types derive Serde traits for deserialization from config files, and every
//! field has a default so partial files are accepted.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Name resolution settings.
    pub resolver: ResolverConfig,

    /// Circuit breaker settings (one breaker per client connection).
    pub breaker: BreakerConfig,

    /// Retry/backoff settings.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Name resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Port used when a target does not specify one.
    pub default_port: String,

    /// Port used for a nameserver authority that does not specify one.
    pub dns_server_port: String,

    /// Interval between bulk clears of the shared address cache, in milliseconds.
    pub cache_clear_interval_ms: u64,

    /// Deadline for a single hostname lookup, in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl ResolverConfig {
    pub fn cache_clear_interval(&self) -> Duration {
        Duration::from_millis(self.cache_clear_interval_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_port: "443".to_string(),
            dns_server_port: "53".to_string(),
            cache_clear_interval_ms: 30_000,
            lookup_timeout_ms: 5_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Minimum requests in the rolling interval before the breaker may trip.
    pub min_requests: u32,

    /// Failure ratio (0, 1] at or above which the breaker trips.
    pub failure_ratio: f64,

    /// Time the breaker stays open before allowing trial calls, in milliseconds.
    pub open_duration_ms: u64,

    /// Rolling interval for closed-state counts, in milliseconds.
    /// Zero means twice the open duration.
    pub interval_ms: u64,

    /// Trial calls allowed while half-open.
    pub max_half_open_requests: u32,
}

impl BreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }

    pub fn interval(&self) -> Duration {
        if self.interval_ms == 0 {
            self.open_duration() * 2
        } else {
            Duration::from_millis(self.interval_ms)
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_requests: 100,
            failure_ratio: 0.6,
            open_duration_ms: 60_000,
            interval_ms: 0,
            max_half_open_requests: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Total attempts per call, including the first. Zero means unbounded.
    pub max_attempts: u32,

    /// Stop retrying once the backoff delay reaches its cap.
    pub stop_at_cap: bool,

    /// Random jitter added to each delay, as a fraction of it (0.0 disables).
    pub jitter_ratio: f64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            max_delay_ms: 30_000,
            max_attempts: 3,
            stop_at_cap: false,
            jitter_ratio: 0.0,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single call attempt in milliseconds. Zero disables it.
    pub call_ms: u64,
}

impl TimeoutConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { call_ms: 60_000 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
