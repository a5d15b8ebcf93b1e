//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_LEASED, HANDSHAKES_TOTAL, HEARTBEATS_TOTAL, IDLE_CONNECTION_ERRORS_TOTAL,
    POOL_CREATIONS_TOTAL, POOL_CREATION_DURATION, POOL_IDLE, POOL_SIZE, PROBES_TOTAL,
    QUERIES_TOTAL, QUERY_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Helper struct for recording pool lifecycle metrics
pub struct PoolMetrics;

impl PoolMetrics {
    /// Record the outcome of a pool creation attempt
    pub fn record_creation(success: bool) {
        POOL_CREATIONS_TOTAL
            .with_label_values(&[result_label(success)])
            .inc();
    }

    /// Record how long a pool creation took
    pub fn record_creation_duration(elapsed: Duration) {
        POOL_CREATION_DURATION.observe(elapsed.as_secs_f64());
    }

    /// Record an error on an idle connection
    pub fn record_idle_error() {
        IDLE_CONNECTION_ERRORS_TOTAL.inc();
    }

    /// Update pool occupancy gauges
    pub fn update_occupancy(size: u32, idle: usize) {
        POOL_SIZE.set(size as i64);
        POOL_IDLE.set(idle as i64);
    }
}

/// Helper struct for recording diagnostic metrics
pub struct DiagnosticMetrics;

impl DiagnosticMetrics {
    /// Record a TCP probe outcome
    pub fn record_probe(outcome: &str) {
        PROBES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a protocol handshake outcome
    pub fn record_handshake(outcome: &str) {
        HANDSHAKES_TOTAL.with_label_values(&[outcome]).inc();
    }
}

/// Helper struct for recording query metrics
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a finished query
    pub fn record(success: bool, elapsed: Duration) {
        let status = if success { "ok" } else { "error" };
        QUERIES_TOTAL.with_label_values(&[status]).inc();
        QUERY_DURATION.observe(elapsed.as_secs_f64());
    }

    /// A connection was leased
    pub fn lease_acquired() {
        CONNECTIONS_LEASED.inc();
    }

    /// A leased connection went back to the pool
    pub fn lease_released() {
        CONNECTIONS_LEASED.dec();
    }
}

/// Helper struct for recording heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record a heartbeat ping result
    pub fn record(success: bool) {
        HEARTBEATS_TOTAL.with_label_values(&[result_label(success)]).inc();
    }
}
