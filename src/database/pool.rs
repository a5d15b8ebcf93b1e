//! PostgreSQL pool configuration and the pool handle shared by queries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Connection, Postgres};

use super::error::DatabaseError;
use crate::metrics::PoolMetrics;

/// TLS behaviour for database connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Require TLS and verify the server certificate and host name
    Verify,
    /// Require TLS without verifying the certificate
    #[default]
    SkipVerify,
    /// Plain TCP, for local development only
    Disable,
}

impl TlsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsMode::Verify => "verify",
            TlsMode::SkipVerify => "skip-verify",
            TlsMode::Disable => "disable",
        }
    }

    fn ssl_mode(self) -> PgSslMode {
        match self {
            TlsMode::Verify => PgSslMode::VerifyFull,
            TlsMode::SkipVerify => PgSslMode::Require,
            TlsMode::Disable => PgSslMode::Disable,
        }
    }
}

/// Settings a pool is built from. Immutable once constructed.
#[derive(Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    /// Deadline for acquiring a connection, connecting included
    pub connect_timeout: Duration,
    /// Deadline for diagnostic probes and handshakes
    pub diagnostic_timeout: Duration,
    pub tls: TlsMode,
}

impl PoolConfig {
    /// `host:port` of the target.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(self.tls.ssl_mode())
            .application_name(env!("CARGO_PKG_NAME"))
    }

    /// Pool options with the idle-connection error observer installed.
    ///
    /// Idle connections are pinged before being handed out. A connection the
    /// remote end has dropped is logged and discarded; the pool itself and
    /// whoever is acquiring are unaffected.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(0)
            .idle_timeout(self.idle_timeout)
            .acquire_timeout(self.connect_timeout)
            .test_before_acquire(false)
            .before_acquire(|conn, meta| {
                Box::pin(async move {
                    match conn.ping().await {
                        Ok(()) => Ok(true),
                        Err(e) => {
                            PoolMetrics::record_idle_error();
                            tracing::warn!(
                                error = %e,
                                idle_for_ms = meta.idle_for.as_millis() as u64,
                                age_ms = meta.age.as_millis() as u64,
                                "Unexpected error on idle database connection, discarding it"
                            );
                            Ok(false)
                        }
                    }
                })
            })
    }

    /// Build a pool without opening any connection yet.
    pub fn connect_lazy(&self) -> PgPool {
        self.pool_options().connect_lazy_with(self.connect_options())
    }

    /// Log the effective settings, password excluded.
    pub fn log_summary(&self, message: &'static str) {
        tracing::info!(
            host = %self.host,
            port = self.port,
            database = %self.database,
            user = %self.user,
            max_connections = self.max_connections,
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            connect_timeout_ms = self.connect_timeout.as_millis() as u64,
            tls = self.tls.as_str(),
            "{}",
            message
        );
    }
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("diagnostic_timeout", &self.diagnostic_timeout)
            .field("tls", &self.tls)
            .finish()
    }
}

/// A live connection pool together with where it points.
#[derive(Clone)]
pub struct DbPool {
    pool: PgPool,
    addr: String,
}

impl DbPool {
    /// Build a pool from configuration. No connection is opened until the
    /// first acquire.
    pub fn connect_lazy(config: &PoolConfig) -> Self {
        Self {
            pool: config.connect_lazy(),
            addr: config.addr(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Open connections, leased and idle.
    pub fn size(&self) -> u32 {
        self.pool.size()
    }

    pub fn num_idle(&self) -> usize {
        self.pool.num_idle()
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Lease one connection. It goes back to the pool when dropped or
    /// through `PoolConnection::return_to_pool`.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DatabaseError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| DatabaseError::from_acquire(e, &self.pool, &self.addr))
    }

    /// Close the pool gracefully, waiting for leased connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(addr = %self.addr, "Database connection pool closed");
    }
}
