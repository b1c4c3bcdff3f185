//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ws_tunnels_opened_total` (counter): tunnels that completed the handshake, by service
//! - `ws_handshake_failures_total` (counter): failed upstream handshakes, by reason
//! - `ws_transform_errors_total` (counter): messages dropped by a failing transform
//! - `ws_tunnel_bytes_total` (counter): relayed bytes, by direction
//! - `ws_active_tunnels` (gauge): current tunnel count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Labels are low-cardinality: service name, reason label, direction

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Direction label for client→backend bytes.
pub const UPSTREAM: &str = "upstream";
/// Direction label for backend→client bytes.
pub const DOWNSTREAM: &str = "downstream";

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tunnel_opened(service: &str) {
    metrics::counter!("ws_tunnels_opened_total", "service" => service.to_string()).increment(1);
}

pub fn record_handshake_failure(reason: &'static str) {
    metrics::counter!("ws_handshake_failures_total", "reason" => reason).increment(1);
}

pub fn record_transform_error() {
    metrics::counter!("ws_transform_errors_total").increment(1);
}

pub fn record_bytes(direction: &'static str, bytes: u64) {
    metrics::counter!("ws_tunnel_bytes_total", "direction" => direction).increment(bytes);
}

pub fn set_active_tunnels(count: u64) {
    metrics::gauge!("ws_active_tunnels").set(count as f64);
}
