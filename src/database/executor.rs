//! Parameterized statement execution on the main pool.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Executor, FromRow, Postgres};

use super::error::DatabaseError;
use super::manager::ConnectionPoolManager;
use super::pool::DbPool;
use crate::metrics::QueryMetrics;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    /// Sent as a text-typed NULL
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        SqlParam::Int(value as i64)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Float(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(value: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(value)
    }
}

impl From<serde_json::Value> for SqlParam {
    fn from(value: serde_json::Value) -> Self {
        SqlParam::Json(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Timestamp(v) => query.bind(*v),
            SqlParam::Json(v) => query.bind(v),
        };
    }
    query
}

/// Rows returned by one statement.
#[derive(Default)]
pub struct RowSet {
    rows: Vec<PgRow>,
}

impl std::fmt::Debug for RowSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowSet").field("rows", &self.rows.len()).finish()
    }
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode every row into `T`.
    pub fn decode<T>(&self) -> Result<Vec<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.rows
            .iter()
            .map(|row| T::from_row(row).map_err(DatabaseError::query))
            .collect()
    }

    /// Decode the first row, if there is one.
    pub fn first<T>(&self) -> Result<Option<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.rows
            .first()
            .map(|row| T::from_row(row).map_err(DatabaseError::query))
            .transpose()
    }
}

impl From<Vec<PgRow>> for RowSet {
    fn from(rows: Vec<PgRow>) -> Self {
        Self { rows }
    }
}

/// A connection leased for the duration of one statement.
///
/// [`Lease::release`] hands the connection back before the caller returns.
/// If the lease is dropped instead, for example because the caller was
/// cancelled, the connection returns on a background task.
struct Lease {
    conn: PoolConnection<Postgres>,
    _gauge: LeaseGauge,
}

impl Lease {
    async fn acquire(pool: &DbPool) -> Result<Self, DatabaseError> {
        let conn = pool.acquire().await?;
        Ok(Self {
            conn,
            _gauge: LeaseGauge::new(),
        })
    }

    async fn release(mut self) {
        self.conn.return_to_pool().await;
    }
}

struct LeaseGauge;

impl LeaseGauge {
    fn new() -> Self {
        QueryMetrics::lease_acquired();
        Self
    }
}

impl Drop for LeaseGauge {
    fn drop(&mut self) {
        QueryMetrics::lease_released();
    }
}

/// Runs statements on the main pool, one leased connection per call.
#[derive(Clone)]
pub struct QueryExecutor {
    manager: Arc<ConnectionPoolManager>,
}

impl QueryExecutor {
    pub fn new(manager: Arc<ConnectionPoolManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ConnectionPoolManager> {
        &self.manager
    }

    /// Execute one parameterized statement and return its rows.
    ///
    /// The first call creates the pool. Statement failures are returned as
    /// [`DatabaseError::Query`] after the connection has been released. The
    /// statement is never retried.
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, DatabaseError> {
        let pool = self.manager.get_pool().await?;
        let start = Instant::now();

        let mut lease = Lease::acquire(&pool).await?;
        let result = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut *lease.conn)
            .await;
        lease.release().await;

        let elapsed = start.elapsed();
        QueryMetrics::record(result.is_ok(), elapsed);

        match result {
            Ok(rows) => {
                tracing::debug!(
                    rows = rows.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query executed"
                );
                Ok(RowSet::from(rows))
            }
            Err(e) => {
                let err = DatabaseError::query(e);
                tracing::error!(
                    error = %err,
                    code = err.sqlstate().as_deref().unwrap_or(""),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query failed"
                );
                Err(err)
            }
        }
    }

    /// Execute a batch of statements without parameters, such as DDL.
    /// Returns the number of affected rows.
    pub async fn execute_batch(&self, sql: &str) -> Result<u64, DatabaseError> {
        let pool = self.manager.get_pool().await?;
        let start = Instant::now();

        let mut lease = Lease::acquire(&pool).await?;
        let result = (&mut *lease.conn).execute(sqlx::raw_sql(sql)).await;
        lease.release().await;

        QueryMetrics::record(result.is_ok(), start.elapsed());

        result.map(|done| done.rows_affected()).map_err(|e| {
            let err = DatabaseError::query(e);
            tracing::error!(error = %err, "Batch execution failed");
            err
        })
    }

    /// Tear down the main pool.
    pub async fn close_connection(&self) {
        self.manager.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::ErrorKind;
    use crate::database::test_pool_config;
    use tokio::net::TcpListener;

    #[test]
    fn test_param_conversions() {
        assert_eq!(SqlParam::from(7), SqlParam::Int(7));
        assert_eq!(SqlParam::from("hello"), SqlParam::Text("hello".to_string()));
        assert_eq!(SqlParam::from(None::<i64>), SqlParam::Null);
        assert_eq!(SqlParam::from(Some(true)), SqlParam::Bool(true));
    }

    #[test]
    fn test_params_bind_without_panicking() {
        let params = vec![
            SqlParam::Null,
            SqlParam::Bool(true),
            SqlParam::Int(1),
            SqlParam::Float(1.5),
            SqlParam::Text("t".to_string()),
            SqlParam::Timestamp(Utc::now()),
            SqlParam::Json(serde_json::json!({"a": 1})),
        ];
        let _query = bind_params(sqlx::query("SELECT $1, $2, $3, $4, $5, $6, $7"), &params);
    }

    #[test]
    fn test_empty_row_set() {
        let rows = RowSet::default();
        assert!(rows.is_empty());
        assert_eq!(rows.len(), 0);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_statement_futures_are_send() {
        let manager = Arc::new(ConnectionPoolManager::new(test_pool_config(5432), false));
        let executor = QueryExecutor::new(manager);

        let batch = executor.execute_batch("SELECT 1");
        assert_send(&batch);
        let params = [SqlParam::Int(1)];
        let query = executor.query("SELECT $1", &params);
        assert_send(&query);
    }

    #[tokio::test]
    async fn test_query_surfaces_pool_creation_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let manager = Arc::new(ConnectionPoolManager::new(test_pool_config(port), false));
        let executor = QueryExecutor::new(manager.clone());

        let err = executor.query("SELECT 1", &[]).await.err().unwrap();
        assert_ne!(err.kind(), ErrorKind::Query);

        executor.close_connection().await;
        executor.close_connection().await;
    }
}
