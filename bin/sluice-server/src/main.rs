//! sluice-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON in production, pretty in dev).
//! 3. Build the upstream client and the mediation pipeline.
//! 4. Build the Axum router and start the HTTP server with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod state;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use sluice_core::Mediator;
use sluice_core::auth::FileAllowList;
use tracing::{info, warn};

use crate::config::Config;
use crate::state::AppState;
use crate::upstream::OpenAiCompatClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!(
                    "WARN: SLUICE_LOG='{}' is not a valid tracing filter ({}); \
                     falling back to 'info'",
                    cfg.log_level, e
                );
                tracing_subscriber::EnvFilter::new("info")
            }
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "sluice-server starting");

    // ── 3. Mediation pipeline ──────────────────────────────────────────────────
    if cfg.api_key.is_none() {
        warn!("SLUICE_API_KEY is not set; completions will be refused");
    }
    let upstream = OpenAiCompatClient::new(
        cfg.api_endpoint.clone(),
        cfg.api_key.clone(),
        cfg.connect_timeout,
    )?;
    info!(endpoint = %upstream.endpoint(), model = %cfg.model, "upstream client ready");

    let allow_list = FileAllowList::new(cfg.allow_list_path.clone());
    if !allow_list.path().exists() {
        warn!(
            path = %allow_list.path().display(),
            "allow-list file not found; /chat/completions will answer 500 until it exists"
        );
    }

    let mediator = Mediator::new(
        cfg.mediation_settings(),
        Arc::new(upstream),
        Arc::new(allow_list),
    );

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        mediator,
    });

    // ── 4. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("sluice-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
