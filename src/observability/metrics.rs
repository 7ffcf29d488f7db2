//! Metrics collection and exposition.
//!
//! # Metrics
//! - `runtime_requests_total` (counter): requests by application, status
//! - `runtime_request_duration_seconds` (histogram): dispatch latency
//! - `runtime_deployments_total` (counter): deployment operations by outcome
//! - `runtime_websocket_events_total` (counter): session events by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until
//!   [`init_metrics`] installs the Prometheus recorder
//! - Independent from the per-minute statistics served by the admin API

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(application: &str, status: u16, start: Instant) {
    let labels = [
        ("application", application.to_string()),
        ("status", status.to_string()),
    ];
    counter!("runtime_requests_total", &labels).increment(1);
    histogram!("runtime_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_deployment(operation: &'static str, outcome: &'static str) {
    counter!("runtime_deployments_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_ws_event(kind: &'static str) {
    counter!("runtime_websocket_events_total", "kind" => kind).increment(1);
}
