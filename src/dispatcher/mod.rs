//! # Dispatcher: validation, retry-on-overload, problem translation.
//!
//! ```text
//! handle_render(req, cancel)
//!   validate ──✗──► 400 (no worker call)
//!   loop attempt = 1..=max_attempts, until deadline
//!     worker.generate(req)
//!       ok                  ──► bytes
//!       429 and budget left ──► sleep(interval), retry
//!       429 exhausted       ──► 429 Too Many Requests
//!       other status        ──► 4xx Bad Request | 5xx Internal Server Error
//!       transport           ──► 500 Internal Server Error
//! ```
//!
//! ## Rules
//! - Only `QueueFull` is retried; every other outcome is final.
//! - Attempt count and overall deadline bound the loop; the first to trip wins.
//! - Problem details never carry transport errors verbatim.

mod http;
mod problem;

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryPolicy;
use crate::rpc::{RpcError, WorkerClient};
use crate::types::RenderRequest;

pub use http::{router, ProxyState, MAX_BODY_BYTES};
pub use problem::ProblemDetails;

/// A PDF returned through the dispatcher.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub pdf: Vec<u8>,
    pub worker_id: Option<String>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Front-facing request handler.
pub struct Dispatcher {
    client: Arc<dyn WorkerClient>,
    retry: RetryPolicy,
    bus: Bus,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn WorkerClient>, retry: RetryPolicy, bus: Bus) -> Self {
        Self { client, retry, bus }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Validates `request` and renders it on a worker.
    pub async fn handle_render(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
    ) -> Result<RenderOutput, ProblemDetails> {
        request
            .validate()
            .map_err(|e| ProblemDetails::bad_request(format!("Validation error: {e}")))?;

        let started = Instant::now();
        let deadline = started + self.retry.deadline;
        let max = self.retry.attempts();
        let url = request.url.as_str();
        let mut attempt: u32 = 1;

        loop {
            let call = tokio::time::timeout_at(deadline, self.client.generate(request));
            let outcome = tokio::select! {
                res = call => match res {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let elapsed = started.elapsed();
                        warn!(url, attempt, ?elapsed, "render deadline exceeded");
                        return Err(ProblemDetails::internal(
                            "PDF generation exceeded the request deadline",
                        ));
                    }
                },
                _ = cancel.cancelled() => return Err(cancelled()),
            };

            let err = match outcome {
                Ok(resp) => {
                    info!(
                        url,
                        attempt,
                        max,
                        elapsed = ?started.elapsed(),
                        worker = ?resp.worker_id,
                        "generated pdf"
                    );
                    return Ok(RenderOutput {
                        pdf: resp.pdf,
                        worker_id: resp.worker_id,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            if !err.is_queue_full() {
                return Err(self.translate(url, attempt, err));
            }

            let delay = self.retry.delay_after(attempt);
            if attempt >= max || Instant::now() + delay >= deadline {
                warn!(
                    url,
                    attempt,
                    max,
                    elapsed = ?started.elapsed(),
                    "worker queue full, giving up"
                );
                return Err(self.translate(url, attempt, err));
            }

            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_url(url),
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(cancelled()),
            }
            attempt += 1;
        }
    }

    fn translate(&self, url: &str, attempt: u32, err: RpcError) -> ProblemDetails {
        match err {
            RpcError::Status {
                status,
                message,
                worker_id,
            } => {
                warn!(
                    url,
                    attempt,
                    status,
                    worker = ?worker_id,
                    detail = %message,
                    "worker rejected render"
                );
                ProblemDetails::from_worker_status(status, message)
            }
            RpcError::Transport(source) => {
                warn!(url, attempt, error = %source, "worker call failed");
                ProblemDetails::internal("Failed to communicate with PDF worker")
            }
        }
    }
}

fn cancelled() -> ProblemDetails {
    ProblemDetails::internal("Request cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::WorkerResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Answers 429 `busy` times, then `then`.
    struct Scripted {
        busy: u32,
        then: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl WorkerClient for Scripted {
        async fn health(&self, _timeout: Duration) -> Result<(), RpcError> {
            Ok(())
        }

        async fn generate(&self, _request: &RenderRequest) -> Result<WorkerResponse, RpcError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let status = if n < self.busy { 429 } else { self.then };
            if status == 200 {
                return Ok(WorkerResponse {
                    pdf: b"%PDF-1.7".to_vec(),
                    worker_id: Some("w0".into()),
                    browser_version: None,
                });
            }
            Err(RpcError::Status {
                status,
                message: format!("status {status}"),
                worker_id: None,
            })
        }
    }

    fn dispatcher(busy: u32, then: u16) -> (Dispatcher, Arc<Scripted>) {
        dispatcher_with(busy, then, RetryPolicy::default())
    }

    fn dispatcher_with(busy: u32, then: u16, retry: RetryPolicy) -> (Dispatcher, Arc<Scripted>) {
        let client = Arc::new(Scripted {
            busy,
            then,
            calls: AtomicU32::new(0),
        });
        (Dispatcher::new(client.clone(), retry, Bus::new(64)), client)
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_worker() {
        let (d, client) = dispatcher(0, 200);
        let err = d
            .handle_render(&RenderRequest::new("ftp://x"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_queue_full_until_success() {
        let (d, client) = dispatcher(3, 200);
        let out = d
            .handle_render(&RenderRequest::new("https://example.com"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.attempts, 4);
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_not_retried() {
        let (d, client) = dispatcher(0, 504);
        let err = d
            .handle_render(&RenderRequest::new("https://example.com"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status, 504);
        assert_eq!(err.title, "Internal Server Error");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let (d, client) = dispatcher(u32::MAX, 200);
        let err = d
            .handle_render(&RenderRequest::new("https://example.com"), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.status, 429);
        assert_eq!(client.calls.load(Ordering::SeqCst), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_retries_before_attempt_cap() {
        let retry = RetryPolicy {
            max_attempts: 1000,
            backoff: crate::policies::BackoffPolicy::fixed(Duration::from_millis(100)),
            deadline: Duration::from_secs(1),
        };
        let (d, client) = dispatcher_with(u32::MAX, 200, retry);

        let started = Instant::now();
        let err = d
            .handle_render(&RenderRequest::new("https://example.com"), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.status, 429);
        assert!(started.elapsed() <= retry.deadline);
        let calls = client.calls.load(Ordering::SeqCst);
        assert_eq!(calls, 10);
        assert!(calls < retry.max_attempts);
    }
}
