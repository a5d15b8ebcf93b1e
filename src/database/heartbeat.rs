//! Keep-alive ping that stops the database from auto-pausing.
//!
//! Every ping builds its own single-connection pool, runs `SELECT NOW()` and
//! closes the pool again. The main pool is never touched.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::{DatabaseError, ErrorKind};
use super::pool::{DbPool, PoolConfig};
use crate::metrics::HeartbeatMetrics;

/// Result of one heartbeat ping.
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatReport {
    pub success: bool,
    /// Database clock at the time of the ping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub elapsed_ms: u64,
}

/// Pings the database on a throwaway pool.
#[derive(Debug, Clone)]
pub struct HeartbeatProbe {
    config: PoolConfig,
}

impl HeartbeatProbe {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Run one liveness check. Failures are reported in the returned value.
    ///
    /// When this returns, the pool it used is closed and holds no connections.
    pub async fn ping(&self) -> HeartbeatReport {
        let pool = DbPool::connect_lazy(&self.config);
        self.ping_on(&pool).await
    }

    async fn ping_on(&self, pool: &DbPool) -> HeartbeatReport {
        let start = Instant::now();
        tracing::debug!(addr = %pool.addr(), "Sending database heartbeat");

        let result = self.liveness(pool).await;
        pool.close().await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record(result.is_ok());

        match result {
            Ok(timestamp) => {
                tracing::info!(
                    addr = %pool.addr(),
                    db_time = %timestamp,
                    elapsed_ms,
                    "Database heartbeat succeeded"
                );
                HeartbeatReport {
                    success: true,
                    timestamp: Some(timestamp),
                    error: None,
                    error_kind: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                tracing::error!(
                    addr = %pool.addr(),
                    error = %e,
                    error_kind = e.kind().as_str(),
                    elapsed_ms,
                    "Database heartbeat failed"
                );
                HeartbeatReport {
                    success: false,
                    timestamp: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                    elapsed_ms,
                }
            }
        }
    }

    /// Lease the single connection, ask for the server time, release.
    async fn liveness(&self, pool: &DbPool) -> Result<DateTime<Utc>, DatabaseError> {
        let mut conn = pool.acquire().await?;

        let query = sqlx::query_as::<_, (DateTime<Utc>,)>("SELECT NOW()").fetch_one(&mut *conn);
        let result = match tokio::time::timeout(self.config.diagnostic_timeout, query).await {
            Ok(result) => result.map(|(now,)| now).map_err(DatabaseError::query),
            // a connection stuck mid-statement is left for the pool to close
            Err(_) => {
                return Err(DatabaseError::NetworkTimeout {
                    addr: pool.addr().to_string(),
                })
            }
        };

        conn.return_to_pool().await;
        result
    }
}
