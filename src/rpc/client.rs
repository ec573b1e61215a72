//! # Calling a worker.
//!
//! [`WorkerClient`] is the seam between the dispatcher and a worker process.
//! [`HttpWorkerClient`] is the production implementation over `reqwest`;
//! tests substitute scripted clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;

use crate::error::BoxError;
use crate::types::RenderRequest;

/// Response header carrying the worker's identity.
pub const WORKER_ID_HEADER: &str = "x-worker-id";
/// Response header carrying the browser version summary.
pub const BROWSER_VERSION_HEADER: &str = "x-browser-version";

/// Failure calling a worker.
#[derive(Error, Debug)]
pub enum RpcError {
    /// The call never produced an HTTP response (connect, reset, timeout).
    #[error("worker transport failure")]
    Transport(#[source] BoxError),

    /// The worker answered with a non-success status.
    #[error("worker returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        worker_id: Option<String>,
    },
}

impl RpcError {
    /// Wraps a transport error.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        RpcError::Transport(err.into())
    }

    /// Whether the worker rejected the call because it is saturated.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, RpcError::Status { status: 429, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RpcError::Status { status, .. } => Some(*status),
            RpcError::Transport(_) => None,
        }
    }

    pub fn worker_id(&self) -> Option<&str> {
        match self {
            RpcError::Status { worker_id, .. } => worker_id.as_deref(),
            RpcError::Transport(_) => None,
        }
    }
}

/// A successful `/generate` call.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub pdf: Vec<u8>,
    pub worker_id: Option<String>,
    pub browser_version: Option<String>,
}

/// Remote worker operations used by the dispatcher and the connectivity monitor.
#[async_trait]
pub trait WorkerClient: Send + Sync + 'static {
    /// Checks worker readiness, bounded by `timeout`.
    async fn health(&self, timeout: Duration) -> Result<(), RpcError>;

    /// Renders `request` on the worker.
    async fn generate(&self, request: &RenderRequest) -> Result<WorkerResponse, RpcError>;
}

/// [`WorkerClient`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpWorkerClient {
    http: reqwest::Client,
    base: String,
}

impl HttpWorkerClient {
    /// Creates a client for the worker at `base` (e.g. `http://localhost:5031`).
    ///
    /// `request_timeout` bounds each `/generate` call; it should exceed the
    /// worker's render timeout so the worker reports its own `Timeout`.
    pub fn new(base: impl Into<String>, request_timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(RpcError::transport)?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }
}

fn header(resp: &reqwest::Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn health(&self, timeout: Duration) -> Result<(), RpcError> {
        let resp = self
            .http
            .get(format!("{}/health/ready", self.base))
            .timeout(timeout)
            .send()
            .await
            .map_err(RpcError::transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let worker_id = header(&resp, WORKER_ID_HEADER);
        let message = resp.text().await.unwrap_or_default();
        Err(RpcError::Status {
            status: status.as_u16(),
            message,
            worker_id,
        })
    }

    async fn generate(&self, request: &RenderRequest) -> Result<WorkerResponse, RpcError> {
        let resp = self
            .http
            .post(format!("{}/generate", self.base))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(RpcError::transport)?;

        let status = resp.status();
        let worker_id = header(&resp, WORKER_ID_HEADER);
        if status.is_success() {
            let browser_version = header(&resp, BROWSER_VERSION_HEADER);
            let pdf = resp.bytes().await.map_err(RpcError::transport)?;
            return Ok(WorkerResponse {
                pdf: pdf.to_vec(),
                worker_id,
                browser_version,
            });
        }

        let body = resp.bytes().await.unwrap_or_default();
        let message = match std::str::from_utf8(&body) {
            Ok(text) => text.trim().to_string(),
            Err(_) => {
                tracing::warn!(worker = ?worker_id, "worker returned a non-UTF-8 error body");
                String::new()
            }
        };
        Err(RpcError::Status {
            status: status.as_u16(),
            message,
            worker_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_429_is_queue_full() {
        let full = RpcError::Status {
            status: 429,
            message: String::new(),
            worker_id: None,
        };
        let bad = RpcError::Status {
            status: 400,
            message: "bad".into(),
            worker_id: Some("w1".into()),
        };
        let io = RpcError::transport(std::io::Error::other("reset"));
        assert!(full.is_queue_full());
        assert!(!bad.is_queue_full());
        assert!(!io.is_queue_full());
        assert_eq!(bad.worker_id(), Some("w1"));
        assert_eq!(io.status(), None);
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let c = HttpWorkerClient::new("http://localhost:5031/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.base_url(), "http://localhost:5031");
    }
}
