//! Health endpoints
//!
//! `/api/health` reports service and database status; `/api/health/llm`
//! probes the LLM service. Probe failures are reported in the payload and
//! never returned as HTTP errors.

use crate::llm::LlmHealth;
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

/// Service health payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status
    pub status: String,
    /// Crate version
    pub version: String,
    /// Database connectivity: "connected" or "disconnected"
    pub database: String,
}

/// GET /api/health - Service and database status
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.store.healthy().await {
        "connected"
    } else {
        "disconnected"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    })
}

/// GET /api/health/llm - LLM service reachability probe
pub async fn llm_health(State(state): State<AppState>) -> Json<LlmHealth> {
    Json(state.llm.check_health().await)
}
