//! Metrics collection and exposition.
//!
//! # Metrics
//! - `zdd_active_connections` (gauge): current open connection count
//! - `zdd_connections_total` (counter): connections accepted since start
//! - `zdd_signals_total` (counter): lifecycle signals received, by signal
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade and are no-ops until a
//!   recorder is installed
//! - The Prometheus exporter is opt-in

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn set_active_connections(open: u64) {
    metrics::gauge!("zdd_active_connections").set(open as f64);
}

pub fn record_connection_opened() {
    metrics::counter!("zdd_connections_total").increment(1);
}

pub fn record_signal(signal: &'static str) {
    metrics::counter!("zdd_signals_total", "signal" => signal).increment(1);
}
