//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define node lifecycle metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `node_lifecycle_phase` (gauge): 0=not_started 1=starting 2=running 3=draining 4=stopped 5=failed
//! - `node_pending_tasks` (gauge): registered tasks still running while draining
//! - `node_drain_requests_total` (counter): drain requests by kind
//! - `node_shutdowns_total` (counter): process exits by outcome
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Works without an installed recorder, so tests need no setup

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::state::Phase;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_gauge!("node_lifecycle_phase", "Current lifecycle phase of the node");
            describe_gauge!("node_pending_tasks", "Registered tasks still running during shutdown");
            describe_counter!("node_drain_requests_total", "Drain requests received, by kind");
            describe_counter!("node_shutdowns_total", "Node exits, by outcome");
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_phase(phase: Phase) {
    gauge!("node_lifecycle_phase").set(f64::from(phase.ordinal()));
}

pub fn record_pending_tasks(count: usize) {
    gauge!("node_pending_tasks").set(count as f64);
}

pub fn record_drain_request(kind: &'static str) {
    counter!("node_drain_requests_total", "kind" => kind).increment(1);
}

pub fn record_shutdown(outcome: &'static str) {
    counter!("node_shutdowns_total", "outcome" => outcome).increment(1);
}
