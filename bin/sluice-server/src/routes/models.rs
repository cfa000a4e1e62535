//! Model listing, passed through from the provider.

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_models))]
pub struct ModelsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/models", get(list_models))
}

/// Provider model list (`GET /models`). Not subject to the completion gate.
#[utoipa::path(
    get,
    path = "/models",
    tag = "models",
    responses(
        (status = 200, description = "Provider model listing", body = Value),
        (status = 401, description = "No upstream key configured, or upstream rejected it"),
        (status = 429, description = "Upstream rate limit or quota reached"),
        (status = 500, description = "Upstream failure"),
    )
)]
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServerError> {
    state
        .mediator
        .list_models()
        .await
        .map(Json)
        .map_err(ServerError::ModelListing)
}
