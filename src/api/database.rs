//! Database reachability endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::database::{ConnectionDiagnostics, DiagnosticReport, HeartbeatReport};
use crate::server::AppState;

use super::response::ApiResponse;

/// GET /diagnose - DNS resolution and TCP probe of the configured database
pub async fn network_diagnose(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<DiagnosticReport>>) {
    let report = ConnectionDiagnostics::network(state.pool_manager.config()).await;
    report.log();

    if report.is_healthy() {
        (
            StatusCode::OK,
            Json(ApiResponse::ok("network diagnosis completed", report)),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::failed("network diagnosis failed", report)),
        )
    }
}

/// GET /heartbeat - Ping the database so it does not auto-pause
pub async fn heartbeat(State(state): State<AppState>) -> (StatusCode, Json<HeartbeatReport>) {
    let report = state.heartbeat.ping().await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
