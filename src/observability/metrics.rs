//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by endpoint and status
//! - `proxy_request_duration_seconds` (histogram): latency by endpoint
//! - `proxy_errors_total` (counter): failures by endpoint and error code

use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const REQUEST_DURATION: &str = "proxy_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "proxy_errors_total";

/// Latency buckets in seconds, up to the default upstream timeout.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the global Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), DURATION_BUCKETS)?
        .install_recorder()?;
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Record a finished proxy request.
pub fn record_request(endpoint: &str, status: u16, start: Instant) {
    let duration = start.elapsed().as_secs_f64();

    counter!(
        REQUESTS_TOTAL,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(REQUEST_DURATION, "endpoint" => endpoint.to_string()).record(duration);
}

/// Record a failed proxy request by error code.
pub fn record_error(endpoint: &str, code: &'static str) {
    counter!(ERRORS_TOTAL, "endpoint" => endpoint.to_string(), "code" => code).increment(1);
}
