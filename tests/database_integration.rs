//! Tests against a live PostgreSQL.
//!
//! Set `DB_INTEGRATION_TESTS=1` together with the usual `DB_HOST`, `DB_PORT`,
//! `DB_NAME`, `DB_USER`, `DB_PASSWORD` and `DB_TLS_MODE` variables to run them.
//! Without it every test returns immediately.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;

use blog_vpc_service::blog::{BlogError, BlogRepository, NewBlog};
use blog_vpc_service::config::{
    DatabaseConfig, HeartbeatConfig, OtelConfig, ServerConfig, Settings, TelemetryConfig,
};
use blog_vpc_service::database::{
    ConnectionPoolManager, ErrorKind, HeartbeatProbe, PoolStatus, QueryExecutor, SqlParam,
};
use blog_vpc_service::metrics::IDLE_CONNECTION_ERRORS_TOTAL;
use blog_vpc_service::server::{create_app, AppState};

fn live_config() -> Option<DatabaseConfig> {
    if std::env::var("DB_INTEGRATION_TESTS").is_err() {
        return None;
    }
    DatabaseConfig::from_env().ok()
}

fn executor(config: &DatabaseConfig) -> QueryExecutor {
    let manager = ConnectionPoolManager::new(config.pool_config(), config.diagnostics_enabled);
    QueryExecutor::new(Arc::new(manager))
}

#[tokio::test]
async fn test_first_query_creates_pool_and_second_reuses_it() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);

    let rows = assert_ok!(executor.query("SELECT 1", &[]).await);
    assert_eq!(rows.len(), 1);
    assert_eq!(executor.manager().status().await, PoolStatus::Ready);

    assert_ok!(executor.query("SELECT 1", &[]).await);
    assert_eq!(executor.manager().stats().await.creation_attempts, 1);

    executor.close_connection().await;
    executor.close_connection().await;
    assert_eq!(executor.manager().status().await, PoolStatus::Closed);
}

#[tokio::test]
async fn test_concurrent_first_calls_share_one_pool() {
    let Some(config) = live_config() else { return };
    let manager = Arc::new(ConnectionPoolManager::new(config.pool_config(), false));

    let pools = join_all((0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.get_pool().await }
    }))
    .await;

    let first = assert_ok!(pools[0].clone());
    for pool in &pools {
        let pool = assert_ok!(pool.clone());
        assert!(Arc::ptr_eq(&first, &pool));
    }
    assert_eq!(manager.stats().await.creation_attempts, 1);

    manager.close().await;
}

#[tokio::test]
async fn test_failed_query_releases_connection() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);

    assert_ok!(executor.query("SELECT 1", &[]).await);
    let pool = assert_ok!(executor.manager().get_pool().await);
    let idle_before = pool.num_idle();
    let size_before = pool.size();

    for _ in 0..20 {
        let err = assert_err!(executor.query("SELEKT nonsense", &[]).await);
        assert_eq!(err.kind(), ErrorKind::Query);
        assert_eq!(err.sqlstate().as_deref(), Some("42601"));
        assert_eq!(pool.num_idle(), idle_before);
    }
    assert_eq!(pool.size(), size_before);

    executor.close_connection().await;
}

#[tokio::test]
async fn test_sequential_queries_reuse_one_connection() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);

    for _ in 0..20 {
        assert_ok!(executor.query("SELECT 1", &[]).await);
        let pool = assert_ok!(executor.manager().get_pool().await);
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.num_idle(), 1);
    }

    executor.close_connection().await;
}

#[tokio::test]
async fn test_dropped_idle_connection_is_replaced() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);
    let admin = self::executor(&config);

    let rows = assert_ok!(executor.query("SELECT pg_backend_pid() AS pid", &[]).await);
    let (pid,): (i32,) = assert_ok!(rows.first()).unwrap();
    let errors_before = IDLE_CONNECTION_ERRORS_TOTAL.get();

    assert_ok!(
        admin
            .query("SELECT pg_terminate_backend($1::INT)", &[SqlParam::from(pid)])
            .await
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    let rows = assert_ok!(executor.query("SELECT 1", &[]).await);
    assert_eq!(rows.len(), 1);
    assert!(IDLE_CONNECTION_ERRORS_TOTAL.get() > errors_before);
    assert_eq!(executor.manager().status().await, PoolStatus::Ready);

    executor.close_connection().await;
    admin.close_connection().await;
}

#[tokio::test]
async fn test_bound_parameters() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);

    let rows = assert_ok!(
        executor
            .query(
                "SELECT $1::BIGINT + 1 AS n, $2::TEXT AS t",
                &[SqlParam::from(41_i64), SqlParam::from("hi")],
            )
            .await
    );
    let (n, t): (i64, String) = assert_ok!(rows.first()).unwrap();
    assert_eq!(n, 42);
    assert_eq!(t, "hi");

    executor.close_connection().await;
}

#[tokio::test]
async fn test_heartbeat_succeeds_and_leaves_nothing_open() {
    let Some(config) = live_config() else { return };
    let probe = HeartbeatProbe::new(config.heartbeat_pool_config());
    let observer = executor(&config);

    let report = probe.ping().await;

    assert!(report.success, "{:?}", report.error);
    assert!(report.timestamp.is_some());

    let rows = assert_ok!(
        observer
            .query(
                "SELECT COUNT(*) FROM pg_stat_activity \
                 WHERE application_name = $1 AND query = 'SELECT NOW()'",
                &[SqlParam::from(env!("CARGO_PKG_NAME"))],
            )
            .await
    );
    let (open,): (i64,) = assert_ok!(rows.first()).unwrap();
    assert_eq!(open, 0);

    observer.close_connection().await;
}

#[tokio::test]
async fn test_create_blog_table_route() {
    let Some(config) = live_config() else { return };
    let state = AppState::new(Settings {
        server: ServerConfig::default(),
        database: config,
        heartbeat: HeartbeatConfig::default(),
        telemetry: TelemetryConfig::default(),
        otel: OtelConfig::default(),
    });
    let app = create_app(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/createBlogTable")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    state.pool_manager.close().await;
}

#[tokio::test]
async fn test_blog_lifecycle() {
    let Some(config) = live_config() else { return };
    let executor = executor(&config);
    let blogs = BlogRepository::new(executor.clone());

    assert_ok!(blogs.create_table().await);

    let draft = NewBlog {
        title: Some("Integration".to_string()),
        content: Some("Written by the integration tests".to_string()),
        author: Some("tests".to_string()),
    }
    .validate()
    .unwrap();
    let created = assert_ok!(blogs.create(draft).await);
    assert_eq!(created.title, "Integration");

    let fetched = assert_ok!(blogs.get(created.id).await);
    assert_eq!(fetched.author, "tests");

    let all = assert_ok!(blogs.list().await);
    assert!(all.iter().any(|blog| blog.id == created.id));

    assert_eq!(assert_ok!(blogs.delete(created.id).await), created.id);
    assert!(matches!(
        blogs.get(created.id).await,
        Err(BlogError::NotFound(_))
    ));
    assert!(matches!(
        blogs.delete(created.id).await,
        Err(BlogError::NotFound(_))
    ));

    executor.close_connection().await;
}
