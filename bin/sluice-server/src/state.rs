//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use sluice_core::Mediator;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The mediation pipeline; owns the process-wide completion gate.
    pub mediator: Mediator,
}
