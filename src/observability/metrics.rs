//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engine_configuration_loads_total` (counter): loads by outcome
//! - `engine_configuration_load_seconds` (histogram): load duration
//! - `engine_loader_handles_constructed_total` (counter): handles built, by kind
//! - `engine_loader_reload_failures_total` (counter): failed handle reloads, by kind
//! - `engine_bootstrap_retries_total` (counter): background bootstrap attempts
//! - `engine_configurations_loaded` (gauge): configurations currently registered

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_load(outcome: &'static str, start: Instant) {
    metrics::counter!("engine_configuration_loads_total", "outcome" => outcome).increment(1);
    metrics::histogram!("engine_configuration_load_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_handle_constructed(kind: &'static str) {
    metrics::counter!("engine_loader_handles_constructed_total", "kind" => kind).increment(1);
}

pub fn record_reload_failure(kind: &'static str) {
    metrics::counter!("engine_loader_reload_failures_total", "kind" => kind).increment(1);
}

pub fn record_bootstrap_retry() {
    metrics::counter!("engine_bootstrap_retries_total").increment(1);
}

pub fn record_loaded_count(count: usize) {
    metrics::gauge!("engine_configurations_loaded").set(count as f64);
}
