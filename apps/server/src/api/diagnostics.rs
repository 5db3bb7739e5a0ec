use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use quotegate_gateway::DiagnosticsSnapshot;

use crate::main_lib::AppState;

/// Engine counters, last decision and error, cache and budget state.
async fn get_diagnostics(State(state): State<Arc<AppState>>) -> Json<DiagnosticsSnapshot> {
    Json(state.engine.snapshot())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/diagnostics", get(get_diagnostics))
}
