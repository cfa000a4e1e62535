//! Chat-completion entry points.
//!
//! `POST /` is the unauthenticated entry for trusted local callers;
//! `POST /chat/completions` is the same pipeline behind the allow-list
//! middleware. Streaming answers are sent as server-sent events ending with
//! `data: [DONE]`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::Value;
use sluice_core::{Mediated, MediationError};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(local_completion, chat_completions))]
pub struct CompletionsApi;

/// Unauthenticated completion (`POST /`).
#[utoipa::path(
    post,
    path = "/",
    tag = "chat",
    request_body = Value,
    responses(
        (status = 200, description = "Completion result or event stream", body = Value),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "No upstream key configured, or upstream rejected it"),
        (status = 429, description = "Upstream quota exhausted"),
        (status = 500, description = "Upstream failure"),
    )
)]
pub async fn local_completion(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ServerError> {
    mediate(&state, &body).await
}

/// Allow-listed completion (`POST /chat/completions`).
#[utoipa::path(
    post,
    path = "/chat/completions",
    tag = "chat",
    request_body = Value,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Completion result or event stream", body = Value),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Missing or unknown bearer token, or no upstream key"),
        (status = 429, description = "Upstream quota exhausted"),
        (status = 500, description = "Allow-list unavailable or upstream failure"),
    )
)]
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ServerError> {
    mediate(&state, &body).await
}

// Both entry points share one pipeline; they are separate handlers only so
// each path carries its own OpenAPI entry. The allow-list check is the
// route layer on `/chat/completions`.
async fn mediate(state: &AppState, body: &Bytes) -> Result<Response, ServerError> {
    let payload = parse_payload(body)?;
    respond(state.mediator.complete(payload).await)
}

fn parse_payload(body: &Bytes) -> Result<Value, ServerError> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("request body must be JSON".into()));
    }
    serde_json::from_slice(body).map_err(|e| ServerError::BadRequest(format!("invalid JSON: {e}")))
}

fn respond(outcome: Result<Mediated, MediationError>) -> Result<Response, ServerError> {
    match outcome? {
        Mediated::Completion(result) => Ok(Json(result).into_response()),
        Mediated::Stream(events) => {
            debug!("opening event stream");
            let sse = events.map(|event| Ok::<Event, Infallible>(Event::default().data(event.data())));
            Ok(Sse::new(sse).into_response())
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
