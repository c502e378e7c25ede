use axum::{extract::State, Json};
use crate::models::{HealthResponse, ReadyResponse};
use crate::state::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint
pub async fn ready_check(State(state): State<AppState>) -> Json<ReadyResponse> {
    debug!("Readiness check requested");
    let stats = state.registry().stats();
    Json(ReadyResponse {
        status: "ok".to_string(),
        connections: stats.connections as u32,
        started_at: state.started_at.to_rfc3339(),
    })
}
