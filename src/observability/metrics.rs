//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define connector metrics (resolutions, cache churn, breaker transitions, retries)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `resolver_resolutions_total` (counter): address sets produced, by `source`
//!   (`cache`, `lookup`, `literal`, `passthrough`)
//! - `resolver_lookup_failures_total` (counter): failed or timed out lookups
//! - `resolver_dropped_addresses_total` (counter): lookup results that were not IPs
//! - `address_cache_clears_total` (counter): entries removed by bulk clears
//! - `address_cache_entries` (gauge): current cached hostnames
//! - `circuit_breaker_transitions_total` (counter): by `name`, `from`, `to`
//! - `circuit_breaker_rejections_total` (counter): fast failures, by `name`
//! - `retry_attempts_total` (counter): retries scheduled after a failed attempt
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are bounded: sources and states are static strings, breaker
//!   names are one per connection

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

const RESOLUTIONS_TOTAL: &str = "resolver_resolutions_total";
const LOOKUP_FAILURES_TOTAL: &str = "resolver_lookup_failures_total";
const DROPPED_ADDRESSES_TOTAL: &str = "resolver_dropped_addresses_total";
const CACHE_CLEARS_TOTAL: &str = "address_cache_clears_total";
const CACHE_ENTRIES: &str = "address_cache_entries";
const BREAKER_TRANSITIONS_TOTAL: &str = "circuit_breaker_transitions_total";
const BREAKER_REJECTIONS_TOTAL: &str = "circuit_breaker_rejections_total";
const RETRY_ATTEMPTS_TOTAL: &str = "retry_attempts_total";

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_resolution(source: &'static str) {
    counter!(RESOLUTIONS_TOTAL, "source" => source).increment(1);
}

pub fn record_lookup_failure() {
    counter!(LOOKUP_FAILURES_TOTAL).increment(1);
}

pub fn record_dropped_address() {
    counter!(DROPPED_ADDRESSES_TOTAL).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!(CACHE_ENTRIES).set(entries as f64);
}

/// Record a bulk clear that removed `removed` entries.
pub fn record_cache_clear(removed: usize) {
    counter!(CACHE_CLEARS_TOTAL).increment(removed as u64);
    gauge!(CACHE_ENTRIES).set(0.0);
}

pub fn record_breaker_transition(name: &str, from: &'static str, to: &'static str) {
    counter!(
        BREAKER_TRANSITIONS_TOTAL,
        "name" => name.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_rejection(name: &str) {
    counter!(BREAKER_REJECTIONS_TOTAL, "name" => name.to_string()).increment(1);
}

pub fn record_retry() {
    counter!(RETRY_ATTEMPTS_TOTAL).increment(1);
}
