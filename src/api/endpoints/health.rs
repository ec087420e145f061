//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
}

/// `GET /health`: liveness check for the desktop shell.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    let active_sessions = ctx.orchestrator.registry().session_count().await;

    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        active_sessions,
    })
}
