use axum::{
    Json,
    body::{Body, Bytes},
    extract::Request,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::json;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Bodies above this size are summarised instead of logged.
const MAX_LOGGED_BODY: usize = 1024;

/// Largest request body buffered for logging; bigger requests get 413.
pub const MAX_REQUEST_BODY: usize = 2 * 1024 * 1024;

pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    async move {
        info!("→ request started");
        let (parts, body) = req.into_parts();

        let response = match Limited::new(body, MAX_REQUEST_BODY).collect().await {
            Ok(collected) => {
                let req_bytes = collected.to_bytes();
                log_body("request", &parts.headers, &req_bytes);
                let mut req = Request::from_parts(parts, Body::from(req_bytes));
                if let Some(value) = &trace_header {
                    req.headers_mut().insert(X_TRACE_ID, value.clone());
                }
                next.run(req).await
            }
            Err(e) => reject_body(e),
        };

        // Event streams hold the completion gate until drained; pass them
        // through untouched.
        let mut response = if is_event_stream(response.headers()) {
            info!("response is an event stream; body not logged");
            response
        } else {
            let (parts, body) = response.into_parts();
            let res_bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => Bytes::new(),
            };
            log_body("response", &parts.headers, &res_bytes);
            Response::from_parts(parts, Body::from(res_bytes))
        };

        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );

        response
    }
    .instrument(span)
    .await
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

fn reject_body(e: axum::BoxError) -> Response {
    if e.downcast_ref::<LengthLimitError>().is_some() {
        warn!(limit = MAX_REQUEST_BODY, "request body too large");
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": "request body too large" })),
        )
            .into_response()
    } else {
        warn!(error = %e, "request body could not be read");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "request body could not be read" })),
        )
            .into_response()
    }
}

fn log_body(direction: &str, headers: &HeaderMap, bytes: &Bytes) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let is_json = content_type.contains("application/json");

    if is_json && bytes.len() < MAX_LOGGED_BODY {
        if let Ok(text) = std::str::from_utf8(bytes) {
            info!("{} body: {}", direction, text);
        }
    } else if !bytes.is_empty() {
        info!(
            "{} body: [skipped: type={}, size={}]",
            direction,
            content_type,
            bytes.len()
        );
    }
}
