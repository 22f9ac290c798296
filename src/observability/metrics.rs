//! Metrics collection and exposition.
//!
//! # Metrics
//! - `failover_probe_total` (counter): probe rounds by cluster, outcome
//! - `failover_leader_changes_total` (counter): observed leader changes by cluster
//! - `failover_switch_total` (counter): per-route switch results by outcome
//! - `failover_noop_total` (counter): switches skipped as unchanged
//! - `failover_http_retries_total` (counter): retried admin/probe requests
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(cluster: &str, outcome: &'static str) {
    counter!("failover_probe_total", "cluster" => cluster.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_leader_change(cluster: &str) {
    counter!("failover_leader_changes_total", "cluster" => cluster.to_string()).increment(1);
}

pub fn record_switch(outcome: &'static str) {
    counter!("failover_switch_total", "outcome" => outcome).increment(1);
}

pub fn record_noop() {
    counter!("failover_noop_total").increment(1);
}

pub fn record_http_retry(method: &str) {
    counter!("failover_http_retries_total", "method" => method.to_string()).increment(1);
}
