//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define engine metrics (requests, latency, rejections, faults)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): latency distribution
//! - `switchyard_rate_limited_total` (counter): requests rejected with 429
//! - `switchyard_timeouts_total` (counter): chains cut short by a deadline
//! - `switchyard_panics_total` (counter): panics caught by recovery
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no recorder installed
//!   every call is a no-op, so tests need no setup
//! - Labels stay low-cardinality: method and status, never path

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION: &str = "switchyard_request_duration_seconds";
pub const RATE_LIMITED_TOTAL: &str = "switchyard_rate_limited_total";
pub const TIMEOUTS_TOTAL: &str = "switchyard_timeouts_total";
pub const PANICS_TOTAL: &str = "switchyard_panics_total";

/// Install the Prometheus recorder and its HTTP listener on `addr`.
///
/// Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!(REQUESTS_TOTAL, "Requests handled, by method and status");
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "Request latency");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    describe_counter!(TIMEOUTS_TOTAL, "Handler chains cut short by a deadline");
    describe_counter!(PANICS_TOTAL, "Handler panics caught by recovery");
}

pub fn record_request(method: &str, status: u16, elapsed: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION, "method" => method.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_rate_limited() {
    counter!(RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_timeout() {
    counter!(TIMEOUTS_TOTAL).increment(1);
}

pub fn record_panic() {
    counter!(PANICS_TOTAL).increment(1);
}
