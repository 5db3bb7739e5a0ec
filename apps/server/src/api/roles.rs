use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use quotegate_gateway::{ResolutionResult, ResolveOptions, RolePolicy};

use crate::{error::ApiResult, main_lib::AppState};

/// Configured roles with their provider chains, in document order.
async fn list_roles(State(state): State<Arc<AppState>>) -> Json<Vec<RolePolicy>> {
    let policies = state
        .engine
        .policies()
        .policies()
        .iter()
        .map(|p| p.as_ref().clone())
        .collect();
    Json(policies)
}

/// Resolve a role. `forceProvider` and `bypassCache` map onto [`ResolveOptions`].
async fn resolve_role(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Query(options): Query<ResolveOptions>,
) -> ApiResult<Json<ResolutionResult>> {
    let result = state.engine.resolve(&role, options).await?;
    Ok(Json(result))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/roles/{role}/resolve", get(resolve_role))
}
