//! Metrics collection and exposition.
//!
//! # Metrics
//! - `agent_signals_total` (counter): signals serviced by the control loop
//! - `agent_config_reloads_total` (counter): reload attempts by outcome
//! - `agent_join_contacts_total` (counter): peers contacted at startup by pool
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic increments)
//! - Prometheus exposition on its own listener, enabled via config

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::lifecycle::signals::ShutdownSignal;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(err) => tracing::error!(error = %err, "Failed to start metrics endpoint"),
    }
}

/// Count a signal serviced by the control loop.
pub fn record_signal(signal: ShutdownSignal) {
    ::metrics::counter!("agent_signals_total", "signal" => signal.to_string()).increment(1);
}

/// Count a configuration reload attempt.
pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "error" };
    ::metrics::counter!("agent_config_reloads_total", "outcome" => outcome).increment(1);
}

/// Count peers contacted by a startup join.
pub fn record_join(pool: &'static str, contacted: usize) {
    ::metrics::counter!("agent_join_contacts_total", "pool" => pool).increment(contacted as u64);
}
