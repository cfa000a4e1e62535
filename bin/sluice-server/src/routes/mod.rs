//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional OpenAPI document (disable with `SLUICE_ENABLE_OPENAPI=false`)
//! - `GET /` status and `POST /` unauthenticated local completion
//! - `POST /chat/completions` behind the bearer-token allow-list
//! - `GET /models` provider model listing

mod completions;
pub mod doc;
mod models;
mod status;

use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use crate::middleware::{auth, cors, trace};
use crate::state::AppState;
use std::sync::Arc;
use tower::ServiceBuilder;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/chat/completions", post(completions::chat_completions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_allow_listed,
        ));

    let mut app = Router::new()
        .route(
            "/",
            get(status::get_status).post(completions::local_completion),
        )
        .merge(authenticated)
        .merge(models::router());

    if state.config.enable_openapi {
        let api_doc = doc::get_docs();
        app = app.route(
            "/api-docs/openapi.json",
            get(move || std::future::ready(Json(api_doc.clone()))),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
