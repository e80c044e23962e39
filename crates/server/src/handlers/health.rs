//! Liveness endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Storage backend in use.
    pub storage: &'static str,
    /// Number of live upload sessions.
    pub active_uploads: usize,
}

/// GET /v1/health - Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    // Check storage backend connectivity
    state.storage.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        storage: state.storage.backend_name(),
        active_uploads: state.uploads.active_sessions(),
    }))
}
