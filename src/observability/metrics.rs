//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define honeypot metrics (requests, log drops, regex rejections)
//! - Expose a Prometheus-compatible scrape endpoint when configured
//!
//! # Metrics
//! - `deadend_requests_total` (counter): requests by method, status
//! - `deadend_request_duration_seconds` (histogram): handling latency
//! - `deadend_log_drops_total` (counter): records the shipper could not queue
//! - `deadend_log_queue_depth` (gauge): shipper queue occupancy
//! - `deadend_regex_rejections_total` (counter): rejected regex routes by reason
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Method label is clamped to the standard verbs plus `OTHER`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

const KNOWN_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let method = method_label(method);
    counter!(
        "deadend_requests_total",
        "method" => method,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("deadend_request_duration_seconds", "method" => method)
        .record(start.elapsed().as_secs_f64());
}

/// Record one log record dropped because the shipper queue was full.
pub fn record_log_drop() {
    counter!("deadend_log_drops_total").increment(1);
}

/// Current number of records waiting in the shipper queue.
pub fn record_queue_depth(depth: usize) {
    gauge!("deadend_log_queue_depth").set(depth as f64);
}

/// Record a regex route refused by the validator.
pub fn record_regex_rejection(reason: &'static str) {
    counter!("deadend_regex_rejections_total", "reason" => reason).increment(1);
}

fn method_label(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|known| **known == method)
        .copied()
        .unwrap_or("OTHER")
}
