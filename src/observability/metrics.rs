//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): inbound requests by outcome
//! - `relay_request_duration_seconds` (histogram): time to relay the primary response
//! - `relay_dispatch_total` (counter): outbound deliveries by role and outcome
//! - `relay_config_reloads_total` (counter): reload attempts by result
//! - `relay_active_connections` (gauge): current inbound connection count
//!
//! Without an installed exporter every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Count one inbound request and time it.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("relay_requests_total", "outcome" => outcome).increment(1);
    histogram!("relay_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Count one outbound delivery.
pub fn record_dispatch(role: &'static str, outcome: &'static str) {
    counter!("relay_dispatch_total", "role" => role, "outcome" => outcome).increment(1);
}

/// Count one reload attempt.
pub fn record_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("relay_config_reloads_total", "result" => result).increment(1);
}

/// Publish the open inbound connection count.
pub fn set_active_connections(count: u64) {
    gauge!("relay_active_connections").set(count as f64);
}
