//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingress_bytes_total{direction}` (counter): bytes moved through the shaper
//! - `ingress_shaping_delays_total{direction}` (counter): transfers the shaper delayed
//! - `ingress_connections_total` (counter): accepted connections
//! - `ingress_active_connections` (gauge): connections currently open
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; a no-op until a recorder is installed
//! - Prometheus exposition is optional and served from the boss pool

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a Tokio runtime; the HTTP listener is spawned onto it.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    metrics::describe_counter!(
        "ingress_bytes_total",
        metrics::Unit::Bytes,
        "Bytes transferred through the global traffic shaper"
    );
    metrics::describe_counter!(
        "ingress_shaping_delays_total",
        "Transfers delayed by the global traffic shaper"
    );
    metrics::describe_counter!("ingress_connections_total", "Accepted connections");
    metrics::describe_gauge!("ingress_active_connections", "Connections currently open");
}
