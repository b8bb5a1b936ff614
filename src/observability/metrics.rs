//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache outcome
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_upstream_calls_total` (counter): upstream responses by status
//! - `proxy_upstream_errors_total` (counter): transport failures by kind
//! - `proxy_coalesced_requests_total` (counter): followers served by a leader
//! - `proxy_rate_limited_total` (counter): requests rejected by a saturated limiter
//! - `proxy_cache_entries` (gauge): stored entries after the last sweep
//! - `proxy_cache_evictions_total` (counter): entries removed by sweeps
//! - `proxy_cache_store_errors_total` (counter): backend failures by operation
//! - `proxy_error_budget_remaining` (gauge): last observed upstream budget
//! - `proxy_banned` (gauge): 1 while the ban flag is set

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, cache: &'static str, elapsed: Duration) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_upstream_call(status: u16) {
    metrics::counter!("proxy_upstream_calls_total", "status" => status.to_string()).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    metrics::counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_coalesced() {
    metrics::counter!("proxy_coalesced_requests_total").increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    metrics::counter!("proxy_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_cache_entries(len: usize) {
    metrics::gauge!("proxy_cache_entries").set(len as f64);
}

pub fn record_cache_evictions(removed: usize) {
    metrics::counter!("proxy_cache_evictions_total").increment(removed as u64);
}

pub fn record_cache_store_error(op: &'static str) {
    metrics::counter!("proxy_cache_store_errors_total", "op" => op).increment(1);
}

pub fn record_error_budget(remaining: i64) {
    metrics::gauge!("proxy_error_budget_remaining").set(remaining as f64);
}

pub fn record_banned(banned: bool) {
    metrics::gauge!("proxy_banned").set(if banned { 1.0 } else { 0.0 });
}
