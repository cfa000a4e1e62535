//! Unified server error type.
//!
//! Handlers return `Result<T, ServerError>`; [`IntoResponse`] performs the
//! single translation from pipeline errors to HTTP status and JSON body.
//! The completion and model-listing entry points word their failures
//! differently, so the same pipeline error is wrapped in a variant that
//! records which entry point produced it.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use sluice_core::{AuthDenied, ConfigError, MediationError, UpstreamError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Failure on a completion entry point.
    #[error(transparent)]
    Completion(#[from] MediationError),

    /// Failure while listing models.
    #[error("model listing failed: {0}")]
    ModelListing(MediationError),

    /// The request body could not be read as JSON.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<AuthDenied> for ServerError {
    fn from(denied: AuthDenied) -> Self {
        ServerError::Completion(denied.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServerError::Completion(e) => completion_failure(e),
            ServerError::ModelListing(e) => model_listing_failure(e),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
        };
        (status, Json(body)).into_response()
    }
}

fn completion_failure(e: MediationError) -> (StatusCode, Value) {
    match e {
        MediationError::Auth(denied) => auth_failure(denied),
        MediationError::Config(ConfigError::MissingKey) => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "No API key found in environment variables" }),
        ),
        MediationError::Validation(v) => (StatusCode::BAD_REQUEST, json!({ "error": v.to_string() })),
        MediationError::Upstream(UpstreamError::Quota(_)) => (
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "status": false, "error": "out of quota" }),
        ),
        MediationError::Upstream(UpstreamError::Unauthorized(_)) => (
            StatusCode::UNAUTHORIZED,
            json!({ "status": false, "error": "Unauthorized - check your API key" }),
        ),
        MediationError::Upstream(UpstreamError::Other(m)) => {
            error!(error = %m, "upstream completion failed");
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": m }))
        }
    }
}

fn model_listing_failure(e: MediationError) -> (StatusCode, Value) {
    match e {
        MediationError::Config(ConfigError::MissingKey) => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "API key not found in environment variables" }),
        ),
        MediationError::Upstream(UpstreamError::Quota(_)) => (
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": "Rate limit exceeded or quota reached" }),
        ),
        MediationError::Upstream(UpstreamError::Unauthorized(_)) => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "Unauthorized - check your API key" }),
        ),
        MediationError::Upstream(UpstreamError::Other(m)) => {
            error!(error = %m, "model listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("Failed to fetch models: {m}") }),
            )
        }
        other => completion_failure(other),
    }
}

fn auth_failure(denied: AuthDenied) -> (StatusCode, Value) {
    match denied {
        AuthDenied::Missing => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "No API key provided" }),
        ),
        AuthDenied::Invalid => (
            StatusCode::UNAUTHORIZED,
            json!({ "error": "Unauthorized - invalid API key" }),
        ),
        AuthDenied::Misconfigured { reason } => {
            error!(%reason, "allow-list unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Server misconfiguration: whitelist file missing" }),
            )
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
