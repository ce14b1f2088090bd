//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define store and resilience metrics
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half_open, 2=open, by breaker
//! - `circuit_breaker_transitions_total` (counter): by breaker, target state
//! - `store_requests_total` (counter): by store, operation, outcome
//! - `store_request_duration_seconds` (histogram): by store, operation
//! - `store_retries_total` (counter): by resource
//! - `sync_compensations_total` (counter): by outcome
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording before `init_metrics` is a no-op

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and start its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_circuit_state(breaker: &str, state: CircuitState) {
    ::metrics::gauge!("circuit_breaker_state", "breaker" => breaker.to_string()).set(state.as_gauge());
}

pub fn record_circuit_transition(breaker: &str, to: CircuitState) {
    ::metrics::counter!(
        "circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record a completed store operation started at `start`.
pub fn record_store_request(store: &'static str, operation: &'static str, outcome: &'static str, start: Instant) {
    ::metrics::counter!(
        "store_requests_total",
        "store" => store,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    ::metrics::histogram!(
        "store_request_duration_seconds",
        "store" => store,
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(resource: &str) {
    ::metrics::counter!("store_retries_total", "resource" => resource.to_string()).increment(1);
}

pub fn record_compensation(outcome: &'static str) {
    ::metrics::counter!("sync_compensations_total", "outcome" => outcome).increment(1);
}
