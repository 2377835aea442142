//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, listener
//! - `gateway_request_duration_seconds` (histogram): latency distribution

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus exporter on its own address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter started"),
        Err(err) => tracing::error!(error = %err, "failed to start metrics exporter"),
    }
}

/// Record one dispatched request.
pub fn record_request(method: &str, status: u16, listener_id: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "listener" => listener_id.to_string(),
    )
    .increment(1);

    histogram!(
        "gateway_request_duration_seconds",
        "listener" => listener_id.to_string(),
    )
    .record(start.elapsed().as_secs_f64());
}
