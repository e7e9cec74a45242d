//! Call WebSocket route
//!
//! `GET /call` upgrades to a voice call. The connection limit middleware is
//! applied here so only call upgrades count against the limits.

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::call::call_handler;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;
use std::sync::Arc;

pub fn create_call_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/call", get(call_handler))
        .layer(middleware::from_fn_with_state(state, connection_limit_middleware))
        .layer(TraceLayer::new_for_http())
}
