//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, ratios within bounds, ports numeric)
//! - Detect invalid combinations (max backoff below base)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConnectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ConnectorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ConnectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let resolver = &config.resolver;
    if resolver.default_port.parse::<u16>().is_err() {
        errors.push(ValidationError::new("resolver.default_port", format!("'{}' is not a valid port", resolver.default_port)));
    }
    if resolver.dns_server_port.parse::<u16>().is_err() {
        errors.push(ValidationError::new("resolver.dns_server_port", format!("'{}' is not a valid port", resolver.dns_server_port)));
    }
    if resolver.cache_clear_interval_ms == 0 {
        errors.push(ValidationError::new("resolver.cache_clear_interval_ms", "must be positive"));
    }
    if resolver.lookup_timeout_ms == 0 {
        errors.push(ValidationError::new("resolver.lookup_timeout_ms", "must be positive"));
    }

    let breaker = &config.breaker;
    if !(breaker.failure_ratio > 0.0 && breaker.failure_ratio <= 1.0) {
        errors.push(ValidationError::new("breaker.failure_ratio", "must be within (0, 1]"));
    }
    if breaker.open_duration_ms == 0 {
        errors.push(ValidationError::new("breaker.open_duration_ms", "must be positive"));
    }
    if breaker.max_half_open_requests == 0 {
        errors.push(ValidationError::new("breaker.max_half_open_requests", "must be at least 1"));
    }

    let retries = &config.retries;
    if retries.base_delay_ms == 0 {
        errors.push(ValidationError::new("retries.base_delay_ms", "must be positive"));
    }
    if retries.max_delay_ms == 0 {
        errors.push(ValidationError::new("retries.max_delay_ms", "must be positive"));
    }
    if retries.max_delay_ms < retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            format!("{} is smaller than base_delay_ms {}", retries.max_delay_ms, retries.base_delay_ms),
        ));
    }
    if !(0.0..=1.0).contains(&retries.jitter_ratio) {
        errors.push(ValidationError::new("retries.jitter_ratio", "must be within [0, 1]"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
