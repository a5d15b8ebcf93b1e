//! Prometheus metrics for the blog service.
//!
//! Covers the database connection lifecycle:
//! - Pool creation attempts and their outcome
//! - Diagnostic probe and handshake outcomes
//! - Query counts, latency and leased connections
//! - Idle-connection errors observed by the pool
//! - Heartbeat results

mod helpers;

pub use helpers::{encode_metrics, DiagnosticMetrics, HeartbeatMetrics, PoolMetrics, QueryMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "blog";

lazy_static! {
    // ============================================================================
    // Pool Metrics
    // ============================================================================

    /// Pool creation attempts by result (success, failure)
    pub static ref POOL_CREATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_db_pool_creations_total", METRIC_PREFIX),
        "Total database pool creation attempts",
        &["result"]
    ).unwrap();

    /// Pool creation latency, diagnostics included
    pub static ref POOL_CREATION_DURATION: Histogram = register_histogram!(
        format!("{}_db_pool_creation_duration_seconds", METRIC_PREFIX),
        "Database pool creation duration in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]
    ).unwrap();

    /// Errors raised by idle pooled connections
    pub static ref IDLE_CONNECTION_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_db_idle_connection_errors_total", METRIC_PREFIX),
        "Total errors detected on idle pooled connections"
    ).unwrap();

    /// Connections currently leased by queries
    pub static ref CONNECTIONS_LEASED: IntGauge = register_int_gauge!(
        format!("{}_db_connections_leased", METRIC_PREFIX),
        "Number of connections currently leased from the pool"
    ).unwrap();

    /// Open connections in the main pool
    pub static ref POOL_SIZE: IntGauge = register_int_gauge!(
        format!("{}_db_pool_size", METRIC_PREFIX),
        "Number of open connections in the main pool"
    ).unwrap();

    /// Idle connections in the main pool
    pub static ref POOL_IDLE: IntGauge = register_int_gauge!(
        format!("{}_db_pool_idle", METRIC_PREFIX),
        "Number of idle connections in the main pool"
    ).unwrap();

    // ============================================================================
    // Diagnostic Metrics
    // ============================================================================

    /// TCP probe outcomes (connected, timeout, refused, unreachable, other)
    pub static ref PROBES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_db_probes_total", METRIC_PREFIX),
        "Total TCP probes by outcome",
        &["outcome"]
    ).unwrap();

    /// Protocol handshake outcomes (ready, starting_up, failed)
    pub static ref HANDSHAKES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_db_handshakes_total", METRIC_PREFIX),
        "Total diagnostic protocol handshakes by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Query Metrics
    // ============================================================================

    /// Queries by status (ok, error)
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_db_queries_total", METRIC_PREFIX),
        "Total queries executed",
        &["status"]
    ).unwrap();

    /// Query latency including connection acquisition
    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        format!("{}_db_query_duration_seconds", METRIC_PREFIX),
        "Query duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat pings by result (success, failure)
    pub static ref HEARTBEATS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_db_heartbeats_total", METRIC_PREFIX),
        "Total database heartbeat pings",
        &["result"]
    ).unwrap();
}
