//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::database::{PoolStats, PoolStatus};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: DatabaseHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealthResponse {
    pub target: String,
    pub diagnostics_enabled: bool,
    #[serde(flatten)]
    pub pool: PoolStats,
}

/// GET /health
///
/// Reports the main pool without creating it. A pool that failed to come up
/// marks the service degraded; an untouched pool is fine.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = state.pool_manager.stats().await;

    let status = match pool.status {
        PoolStatus::Failed => "degraded",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database: DatabaseHealthResponse {
            target: state.pool_manager.config().addr(),
            diagnostics_enabled: state.settings.database.diagnostics_enabled,
            pool,
        },
    })
}
