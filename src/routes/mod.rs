pub mod api;
pub mod call;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Every route the server exposes, with state attached
pub fn create_router(state: Arc<AppState>) -> Router {
    api::create_api_router()
        .merge(call::create_call_router(state.clone()))
        .with_state(state)
}
