//! Lazily created, process-wide connection pool.
//!
//! The manager owns the main pool handle. The first `get_pool` call starts a
//! creation attempt (diagnostics, construction, test acquire); callers that
//! arrive while it is in flight await the same attempt, so at most one pool
//! is ever being built. A ready pool is cached until `close`.
//!
//! State transitions:
//! `Uninitialized -> Initializing -> Ready | Failed`, `Ready -> Closed`.
//! A later `get_pool` after `Failed` or `Closed` starts a new attempt; one
//! that arrives while a close is still running waits for it first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::diagnostics::{ConnectionDiagnostics, DiagnosticReport};
use super::error::DatabaseError;
use super::pool::{DbPool, PoolConfig};
use crate::metrics::PoolMetrics;

/// Builds pools for the manager.
#[async_trait]
pub trait PoolConnector: Send + Sync {
    /// Best-effort diagnostics, run before construction. Must not fail.
    async fn diagnose(&self, config: &PoolConfig) -> DiagnosticReport;

    /// Construct a pool and prove it can hand out a connection.
    async fn open(&self, config: &PoolConfig) -> Result<DbPool, DatabaseError>;
}

/// The PostgreSQL connector used in production.
pub struct PgConnector;

#[async_trait]
impl PoolConnector for PgConnector {
    async fn diagnose(&self, config: &PoolConfig) -> DiagnosticReport {
        ConnectionDiagnostics::diagnose(config).await
    }

    async fn open(&self, config: &PoolConfig) -> Result<DbPool, DatabaseError> {
        let pool = DbPool::connect_lazy(config);

        tracing::info!(addr = %pool.addr(), "Testing database connection");
        match pool.acquire().await {
            Ok(mut conn) => {
                conn.return_to_pool().await;
                tracing::info!(addr = %pool.addr(), "Database connection test succeeded");
                Ok(pool)
            }
            Err(e) => {
                pool.close().await;
                Err(e)
            }
        }
    }
}

/// Lifecycle status of the main pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Closed,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Uninitialized => "uninitialized",
            PoolStatus::Initializing => "initializing",
            PoolStatus::Ready => "ready",
            PoolStatus::Failed => "failed",
            PoolStatus::Closed => "closed",
        }
    }
}

type Creation = Shared<BoxFuture<'static, Result<Arc<DbPool>, DatabaseError>>>;
type Closure = Shared<BoxFuture<'static, ()>>;

enum PoolState {
    Uninitialized,
    Initializing(Creation),
    Ready(Arc<DbPool>),
    Failed(DatabaseError),
    /// Reported as `Closed`; the old pool is still shutting down
    Closing(Closure),
    Closed,
}

impl PoolState {
    fn status(&self) -> PoolStatus {
        match self {
            PoolState::Uninitialized => PoolStatus::Uninitialized,
            PoolState::Initializing(_) => PoolStatus::Initializing,
            PoolState::Ready(_) => PoolStatus::Ready,
            PoolState::Failed(_) => PoolStatus::Failed,
            PoolState::Closing(_) | PoolState::Closed => PoolStatus::Closed,
        }
    }
}

/// Snapshot of the main pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub status: PoolStatus,
    pub size: u32,
    pub idle: usize,
    pub creation_attempts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Owner of the process-wide main pool.
pub struct ConnectionPoolManager {
    config: PoolConfig,
    diagnostics_enabled: bool,
    connector: Arc<dyn PoolConnector>,
    state: Mutex<PoolState>,
    creation_attempts: AtomicU64,
    last_diagnostics: Arc<RwLock<Option<DiagnosticReport>>>,
}

impl ConnectionPoolManager {
    pub fn new(config: PoolConfig, diagnostics_enabled: bool) -> Self {
        Self::with_connector(config, diagnostics_enabled, Arc::new(PgConnector))
    }

    pub fn with_connector(
        config: PoolConfig,
        diagnostics_enabled: bool,
        connector: Arc<dyn PoolConnector>,
    ) -> Self {
        Self {
            config,
            diagnostics_enabled,
            connector,
            state: Mutex::new(PoolState::Uninitialized),
            creation_attempts: AtomicU64::new(0),
            last_diagnostics: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Return the ready pool, creating it first if needed.
    ///
    /// Concurrent callers during creation share one attempt and all see its
    /// result, success or failure.
    pub async fn get_pool(&self) -> Result<Arc<DbPool>, DatabaseError> {
        let creation = loop {
            let closing = {
                let mut state = self.state.lock().await;
                match &*state {
                    PoolState::Ready(pool) => return Ok(pool.clone()),
                    PoolState::Initializing(creation) => break creation.clone(),
                    PoolState::Closing(closure) => closure.clone(),
                    PoolState::Uninitialized | PoolState::Failed(_) | PoolState::Closed => {
                        let creation = self.start_creation();
                        *state = PoolState::Initializing(creation.clone());
                        break creation;
                    }
                }
            };
            self.finish_close(&closing).await;
        };

        let result = creation.clone().await;

        let mut state = self.state.lock().await;
        if let PoolState::Initializing(current) = &*state {
            // close() may have replaced the attempt while we were waiting
            if current.ptr_eq(&creation) {
                *state = match &result {
                    Ok(pool) => PoolState::Ready(pool.clone()),
                    Err(e) => PoolState::Failed(e.clone()),
                };
            }
        }

        result
    }

    fn start_creation(&self) -> Creation {
        let attempt = self.creation_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let config = self.config.clone();
        let connector = self.connector.clone();
        let diagnostics_enabled = self.diagnostics_enabled;
        let last_diagnostics = self.last_diagnostics.clone();

        async move {
            create_pool(
                attempt,
                config,
                connector,
                diagnostics_enabled,
                last_diagnostics,
            )
            .await
        }
        .boxed()
        .shared()
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> PoolStatus {
        self.state.lock().await.status()
    }

    /// Report of the most recent diagnostics run, if any ran.
    pub async fn last_diagnostics(&self) -> Option<DiagnosticReport> {
        self.last_diagnostics.read().await.clone()
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let (size, idle) = match &*state {
            PoolState::Ready(pool) => (pool.size(), pool.num_idle()),
            _ => (0, 0),
        };
        let last_error = match &*state {
            PoolState::Failed(e) => Some(e.to_string()),
            _ => None,
        };
        PoolMetrics::update_occupancy(size, idle);

        PoolStats {
            status: state.status(),
            size,
            idle,
            creation_attempts: self.creation_attempts.load(Ordering::Acquire),
            last_error,
        }
    }

    /// Tear down the main pool. Safe to call any number of times.
    ///
    /// A creation still in flight is awaited and its pool closed as well.
    /// Returns once the pool is fully closed, also for concurrent callers.
    pub async fn close(&self) {
        let closure = {
            let mut state = self.state.lock().await;
            let closure = match std::mem::replace(&mut *state, PoolState::Closed) {
                PoolState::Ready(pool) => async move { pool.close().await }.boxed().shared(),
                PoolState::Initializing(creation) => async move {
                    if let Ok(pool) = creation.await {
                        pool.close().await;
                    }
                }
                .boxed()
                .shared(),
                PoolState::Closing(closure) => closure,
                PoolState::Uninitialized | PoolState::Failed(_) | PoolState::Closed => return,
            };
            *state = PoolState::Closing(closure.clone());
            closure
        };

        self.finish_close(&closure).await;
    }

    async fn finish_close(&self, closure: &Closure) {
        closure.clone().await;

        let mut state = self.state.lock().await;
        if let PoolState::Closing(current) = &*state {
            if current.ptr_eq(closure) {
                *state = PoolState::Closed;
            }
        }
    }
}

async fn create_pool(
    attempt: u64,
    config: PoolConfig,
    connector: Arc<dyn PoolConnector>,
    diagnostics_enabled: bool,
    last_diagnostics: Arc<RwLock<Option<DiagnosticReport>>>,
) -> Result<Arc<DbPool>, DatabaseError> {
    let start = Instant::now();
    tracing::info!(attempt, "Creating database connection pool");

    let report = if diagnostics_enabled {
        let report = connector.diagnose(&config).await;
        report.log();
        *last_diagnostics.write().await = Some(report.clone());
        Some(report)
    } else {
        tracing::debug!(attempt, "Connection diagnostics disabled, skipping");
        None
    };

    config.log_summary("Database pool configuration");

    let result = connector.open(&config).await;
    PoolMetrics::record_creation_duration(start.elapsed());
    PoolMetrics::record_creation(result.is_ok());

    match result {
        Ok(pool) => {
            tracing::info!(
                attempt,
                addr = %pool.addr(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Database connection pool created"
            );
            Ok(Arc::new(pool))
        }
        Err(e) => {
            let e = match &report {
                Some(report) => report.refine(e),
                None => e,
            };
            tracing::error!(
                attempt,
                addr = %config.addr(),
                error = %e,
                error_kind = e.kind().as_str(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Failed to create database connection pool"
            );
            Err(e)
        }
    }
}
