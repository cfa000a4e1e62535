use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ServerError;
use crate::state::AppState;

/// Admit only callers whose bearer token is in the allow-list.
///
/// The allow-list is re-read for every request so revocations apply
/// immediately. Listed entries may be bare tokens or whole header values.
pub async fn require_allow_listed(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    state.mediator.authorize(authorization.as_deref()).await?;
    Ok(next.run(req).await)
}
