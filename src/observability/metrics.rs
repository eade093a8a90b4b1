//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_probe_total` (counter): validation probes by host, result
//! - `proxy_node_unhealthy_total` (counter): unhealthy verdicts by host
//! - `proxy_active_monitors` (gauge): live host monitors
//! - `proxy_failover_total` (counter): failovers by result
//! - `proxy_failover_duration_seconds` (histogram): time to reconnect

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_probe(host: &str, valid: bool) {
    let result = if valid { "valid" } else { "invalid" };
    metrics::counter!("proxy_probe_total", "host" => host.to_string(), "result" => result).increment(1);
}

pub fn record_node_unhealthy(host: &str) {
    metrics::counter!("proxy_node_unhealthy_total", "host" => host.to_string()).increment(1);
}

pub fn record_active_monitors(count: usize) {
    metrics::gauge!("proxy_active_monitors").set(count as f64);
}

pub fn record_failover(result: &'static str, duration: Duration) {
    metrics::counter!("proxy_failover_total", "result" => result).increment(1);
    metrics::histogram!("proxy_failover_duration_seconds").record(duration.as_secs_f64());
}
