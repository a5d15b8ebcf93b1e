//! HTTP API tests that run without a database.
//!
//! The database points at a closed local port, so every route that needs the
//! pool fails fast with a classified error.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

use blog_vpc_service::config::{
    DatabaseConfig, HeartbeatConfig, OtelConfig, ServerConfig, Settings, TelemetryConfig,
};
use blog_vpc_service::database::TlsMode;
use blog_vpc_service::server::{create_app, AppState};

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn test_settings() -> Settings {
    Settings {
        server: ServerConfig::default(),
        database: DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: closed_port().await,
            name: "blog".to_string(),
            user: "blog".to_string(),
            password: "secret".to_string(),
            connect_timeout_ms: 300,
            diagnostic_timeout_ms: 300,
            tls_mode: TlsMode::Disable,
            diagnostics_enabled: false,
            ..DatabaseConfig::default()
        },
        heartbeat: HeartbeatConfig::default(),
        telemetry: TelemetryConfig::default(),
        otel: OtelConfig::default(),
    }
}

async fn test_app() -> (Router, AppState) {
    let state = AppState::new(test_settings().await);
    (create_app(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = request
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_hello() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "GET", "/hello", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "hello world");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "GET", "/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_invalid_blog_ids_are_rejected_before_querying() {
    let (app, state) = test_app().await;

    for uri in ["/blog/abc", "/blog/0", "/blog/-1"] {
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let (status, _) = send(&app, "POST", "/delete/xyz", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let stats = state.pool_manager.stats().await;
    assert_eq!(stats.creation_attempts, 0);
}

#[tokio::test]
async fn test_create_blog_requires_all_fields() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "POST", "/createBlog", Some(r#"{"title":"Hi"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app, "POST", "/createBlog", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_does_not_create_pool() {
    let (app, state) = test_app().await;

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "uninitialized");
    assert_eq!(state.pool_manager.stats().await.creation_attempts, 0);
}

#[tokio::test]
async fn test_unreachable_database_fails_request_and_degrades_health() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "GET", "/blogs", None).await;
    assert_eq!(status.as_u16() / 100, 5);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");

    let (_, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["database"]["status"], "failed");
    assert!(health["database"]["last_error"].is_string());
}

#[tokio::test]
async fn test_create_blog_table_goes_through_pool() {
    let (app, state) = test_app().await;

    let (status, body) = send(&app, "POST", "/createBlogTable", None).await;

    assert_eq!(status.as_u16() / 100, 5);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");
    assert_eq!(state.pool_manager.stats().await.creation_attempts, 1);
}

#[tokio::test]
async fn test_heartbeat_reports_failure() {
    let (app, state) = test_app().await;

    let (status, body) = send(&app, "GET", "/heartbeat", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
    assert!(body.get("timestamp").is_none());
    // the heartbeat never touches the main pool
    assert_eq!(state.pool_manager.stats().await.creation_attempts, 0);
}

#[tokio::test]
async fn test_network_diagnose_reports_refused_port() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, "GET", "/diagnose", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["probe"]["outcome"], "refused");
    assert_eq!(body["data"]["dns"]["addresses"][0], "127.0.0.1");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("blog_"));
}
