//! # The slot seam: what the pool needs from a browser.
//!
//! The pool never talks to a browser directly. It owns `Box<dyn Renderer>`
//! values, moves each into exactly one render task at a time and calls
//! through `&mut self`, so one renderer can never serve two sessions at once.
//!
//! ```text
//! RendererFactory::start(id) ──► Box<dyn Renderer>
//!                                   │ generate(session, request, ctx)
//!                                   │ cleanup(session)           (never cancelled by the caller)
//!                                   │ version()
//!                                   └ close()                    (idempotent, bounded)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, RenderError};
use crate::types::{BrowserVersion, RenderRequest};

use super::session::Session;

/// Cancellation and deadline of one render.
#[derive(Clone, Debug)]
pub struct RenderContext {
    cancel: CancellationToken,
    deadline: Instant,
}

impl RenderContext {
    /// A context cancelled by `cancel` and expiring `timeout` from now.
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with `ClientDropped` once cancelled, `Timeout` once the deadline passed.
    pub fn check(&self) -> Result<(), RenderError> {
        if self.cancel.is_cancelled() {
            return Err(RenderError::client_dropped());
        }
        if Instant::now() >= self.deadline {
            return Err(RenderError::new(ErrorKind::Timeout));
        }
        Ok(())
    }

    /// Resolves with the matching error when the context is cancelled or expires.
    pub async fn done(&self) -> RenderError {
        tokio::select! {
            _ = self.cancel.cancelled() => RenderError::client_dropped(),
            _ = tokio::time::sleep_until(self.deadline) => RenderError::new(ErrorKind::Timeout),
        }
    }

    /// Sleeps for `delay`, aborting early on cancellation or deadline.
    pub async fn sleep(&self, delay: Duration) -> Result<(), RenderError> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            err = self.done() => Err(err),
        }
    }
}

/// One running render slot.
#[async_trait]
pub trait Renderer: Send + 'static {
    /// Slot id (`-1` for the warm-up slot).
    fn id(&self) -> i32;

    /// Renders `request` to PDF bytes.
    ///
    /// Must call [`Session::mark_touched`] before the first command that can
    /// change browser state, and classify every failure at its origin.
    async fn generate(
        &mut self,
        session: &Arc<Session>,
        request: &RenderRequest,
        ctx: &RenderContext,
    ) -> Result<Vec<u8>, RenderError>;

    /// Resets the browser after a session (one attempt; the pool retries).
    async fn cleanup(&mut self, session: &Session) -> Result<(), RenderError>;

    /// Reads the engine version.
    async fn version(&mut self) -> Result<BrowserVersion, RenderError>;

    /// Terminates the slot. Idempotent and bounded in time.
    async fn close(&mut self);
}

/// Starts renderers by slot id.
#[async_trait]
pub trait RendererFactory: Send + Sync + 'static {
    async fn start(&self, id: i32) -> Result<Box<dyn Renderer>, RenderError>;
}
