//! Metrics collection.
//!
//! # Metrics
//! - `dfsr_cache_lookups_total` (counter): vector cache lookups by result
//! - `dfsr_endpoint_online` (gauge): 1=online, 0=offline, per host
//! - `dfsr_endpoint_connects_total` (counter): connection attempts by result
//! - `dfsr_reporter_retries_total` (counter): durable reporter retries
//! - `dfsr_round_duration_seconds` (histogram): polling round latency
//! - `dfsr_round_connections` (gauge): connections polled in the last round
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is left
//!   to the embedding application
//! - Labels are limited to host names and outcomes

use std::time::Duration;
use metrics::{counter, gauge, histogram};

/// Record a cache lookup served from the map (`hit`) or by a fetch.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("dfsr_cache_lookups_total", "result" => result).increment(1);
}

/// Record the outcome of an endpoint connection attempt.
pub fn record_endpoint_connect(host: &str, online: bool) {
    let result = if online { "success" } else { "failure" };
    counter!("dfsr_endpoint_connects_total", "host" => host.to_string(), "result" => result)
        .increment(1);
    record_endpoint_online(host, online);
}

/// Record whether an endpoint is currently online.
pub fn record_endpoint_online(host: &str, online: bool) {
    gauge!("dfsr_endpoint_online", "host" => host.to_string()).set(if online { 1.0 } else { 0.0 });
}

/// Record a retry made by a durable reporter.
pub fn record_retry(host: &str) {
    counter!("dfsr_reporter_retries_total", "host" => host.to_string()).increment(1);
}

/// Record a completed polling round.
pub fn record_round(size: usize, duration: Duration) {
    gauge!("dfsr_round_connections").set(size as f64);
    histogram!("dfsr_round_duration_seconds").record(duration.as_secs_f64());
}
