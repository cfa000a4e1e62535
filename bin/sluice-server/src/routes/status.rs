//! Status endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_status))]
pub struct StatusApi;

/// Returns `{"status": "online", "model": ..., "endpoint": ...}`.
#[utoipa::path(
    get,
    path = "/",
    tag = "status",
    responses(
        (status = 200, description = "Server is online", body = Value)
    )
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "online",
        "model": state.config.model,
        "endpoint": state.config.api_endpoint,
    }))
}
