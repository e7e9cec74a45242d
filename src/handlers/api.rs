use axum::{extract::State, response::Json};
use serde::Serialize;
use std::sync::Arc;

use crate::core::registry::SessionSummary;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub active_turns: usize,
    pub sessions: Vec<SessionSummary>,
}

/// Live call sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.sessions.summaries();
    Json(SessionsResponse {
        count: sessions.len(),
        active_turns: state.sessions.active_turns(),
        sessions,
    })
}
