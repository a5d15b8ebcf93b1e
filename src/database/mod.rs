//! PostgreSQL connection layer.
//!
//! - `probe`: bounded TCP reachability probe
//! - `diagnostics`: staged probe and handshake reports
//! - `pool`: pool configuration and handle
//! - `manager`: lazily created, process-wide main pool
//! - `executor`: statement execution with scoped connection leases
//! - `heartbeat`: keep-alive ping on a throwaway pool

mod diagnostics;
mod error;
mod executor;
mod heartbeat;
mod manager;
mod pool;
mod probe;

pub use diagnostics::{ConnectionDiagnostics, DiagnosticReport, DnsResolution, HandshakeOutcome};
pub use error::{DatabaseError, ErrorKind};
pub use executor::{QueryExecutor, RowSet, SqlParam};
pub use heartbeat::{HeartbeatProbe, HeartbeatReport};
pub use manager::{ConnectionPoolManager, PgConnector, PoolConnector, PoolStats, PoolStatus};
pub use pool::{DbPool, PoolConfig, TlsMode};
pub use probe::{probe, ProbeOutcome, ProbeResult};

#[cfg(test)]
pub(crate) fn test_pool_config(port: u16) -> PoolConfig {
    use std::time::Duration;

    PoolConfig {
        host: "127.0.0.1".to_string(),
        port,
        database: "blog".to_string(),
        user: "blog".to_string(),
        password: "secret123".to_string(),
        max_connections: 2,
        idle_timeout: Duration::from_secs(30),
        connect_timeout: Duration::from_millis(300),
        diagnostic_timeout: Duration::from_millis(300),
        tls: TlsMode::Disable,
    }
}
