//! # Proxy HTTP surface.
//!
//! ```text
//! POST /pdf             application/pdf | application/problem+json
//! GET  /health/startup  503 "Shutting down" | 503 "No connectivity" | 200 "OK"
//! GET  /health/ready    same as startup
//! GET  /health/live     200 "OK"
//! ```
//!
//! `/pdf` checks run in order: method (405), content type (415), declared
//! length (413), body read (413/400), JSON (400), then the dispatcher.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;

use crate::core::ShutdownHost;
use crate::monitor::ConnectivityMonitor;
use crate::types::RenderRequest;

use super::{Dispatcher, ProblemDetails};

/// Largest accepted `/pdf` request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared state of the proxy router.
#[derive(Clone)]
pub struct ProxyState {
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: ConnectivityMonitor,
    pub host: ShutdownHost,
}

/// Builds the proxy router.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/pdf", any(pdf).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
        .route("/health/startup", get(health))
        .route("/health/ready", get(health))
        .route("/health/live", get(live))
        .with_state(state)
}

async fn health(State(state): State<ProxyState>) -> (StatusCode, &'static str) {
    if state.host.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
    } else if !state.monitor.is_healthy() {
        (StatusCode::SERVICE_UNAVAILABLE, "No connectivity")
    } else {
        (StatusCode::OK, "OK")
    }
}

async fn live() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("application/json"))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

async fn pdf(
    State(state): State<ProxyState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        return ProblemDetails::method_not_allowed().into_response();
    }
    if !is_json(&headers) {
        return ProblemDetails::unsupported_media_type().into_response();
    }
    if declared_length(&headers).is_some_and(|len| len > MAX_BODY_BYTES) {
        return ProblemDetails::payload_too_large(MAX_BODY_BYTES).into_response();
    }
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return ProblemDetails::payload_too_large(MAX_BODY_BYTES).into_response();
        }
        Err(rejection) => {
            let detail = format!("Failed to read body: {}", rejection.body_text());
            return ProblemDetails::bad_request(detail).into_response();
        }
    };
    let request: RenderRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let detail = format!("Invalid JSON payload: {err}");
            return ProblemDetails::bad_request(detail).into_response();
        }
    };

    let cancel = state.host.server_context().child_token();
    match state.dispatcher.handle_render(&request, cancel).await {
        Ok(out) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/pdf")],
            out.pdf,
        )
            .into_response(),
        Err(problem) => problem.into_response(),
    }
}
