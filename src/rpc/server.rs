//! # Worker HTTP surface.
//!
//! ```text
//! GET  /health/startup   200 once the pool started, 503 "Starting" before
//! GET  /health/ready     503 "Shutting down" | 503 "Unhealthy" | 200 "OK"
//! GET  /health/live      200 "OK"
//! POST /generate         200 application/pdf | <status> text/plain <message>
//! ```
//!
//! The status of a failed `/generate` mirrors [`ErrorKind::status_code`].
//! Dropping the HTTP connection drops the handler, which cancels the render.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{debug, warn};

use crate::core::ShutdownHost;
use crate::error::{ErrorKind, RenderError};
use crate::pool::WorkerPool;
use crate::types::RenderRequest;

use super::client::{BROWSER_VERSION_HEADER, WORKER_ID_HEADER};

/// Shared state of the worker router.
#[derive(Clone)]
pub struct WorkerState {
    pub pool: WorkerPool,
    pub host: ShutdownHost,
    pub worker_id: Arc<str>,
}

/// Builds the worker router.
pub fn router(state: WorkerState) -> Router {
    Router::new()
        .route("/health/startup", get(startup))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
        .route("/generate", post(generate))
        .with_state(state)
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message.into(),
    )
        .into_response()
}

async fn startup(State(state): State<WorkerState>) -> Response {
    if state.pool.startup_complete() {
        plain(StatusCode::OK, "OK")
    } else {
        plain(StatusCode::SERVICE_UNAVAILABLE, "Starting")
    }
}

async fn ready(State(state): State<WorkerState>) -> Response {
    if state.host.is_shutting_down() {
        plain(StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
    } else if !state.pool.health() {
        plain(StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
    } else {
        plain(StatusCode::OK, "OK")
    }
}

async fn live() -> Response {
    plain(StatusCode::OK, "OK")
}

/// Renders a [`RenderError`] as the worker's wire error.
pub fn error_response(err: &RenderError, worker_id: &str) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut resp = plain(status, err.to_string());
    if let Ok(v) = HeaderValue::from_str(worker_id) {
        resp.headers_mut().insert(WORKER_ID_HEADER, v);
    }
    resp
}

async fn generate(
    State(state): State<WorkerState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = RenderError::invalid(rejection.body_text());
            return error_response(&err, &state.worker_id);
        }
    };
    debug!(url = %request.url, "generate requested");

    let cancel = state.host.server_context().child_token();
    match state.pool.submit(Arc::new(request), cancel).await {
        Ok(result) => {
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/pdf")
                .header(WORKER_ID_HEADER, state.worker_id.as_ref())
                .header(BROWSER_VERSION_HEADER, result.browser.summary());
            match builder.body(Body::from(result.data)) {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(error = %err, "failed to build pdf response");
                    let err = RenderError::new(ErrorKind::UnhandledEngineFault)
                        .with_detail(err.to_string());
                    error_response(&err, &state.worker_id)
                }
            }
        }
        Err(err) => {
            if err.kind() == ErrorKind::InvalidRequest {
                debug!(error = %err, "generate refused");
            }
            error_response(&err, &state.worker_id)
        }
    }
}
