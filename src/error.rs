//! Error types used by the pdfvisor runtime and render slots.
//!
//! This module defines the render error taxonomy and the runtime errors:
//!
//! - [`ErrorKind`]: the classification assigned where a failure originates.
//! - [`RenderError`]: a classified failure carrying an optional detail and cause.
//! - [`RuntimeError`]: errors raised by the pool runtime itself.
//!
//! ## Propagation
//! ```text
//! RenderSlot ──► classifies (kind + cause)
//!     │
//!     ▼
//! WorkerPool ──► adds context (slot, session), kind unchanged
//!     │
//!     ▼ (RPC status code mirrors kind)
//! Dispatcher ──► retries QueueFull only, maps to a problem description
//! ```
//!
//! All types provide `as_label` for logs and telemetry.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed error used as the wrapped cause of a [`RenderError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a failed render.
///
/// Assigned at the point of origin and never collapsed into a generic string.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Every slot is busy and the admission queue is at capacity.
    QueueFull,
    /// The render exceeded its deadline.
    Timeout,
    /// The caller cancelled or went away.
    ClientDropped,
    /// Injecting cookies into the browser failed.
    CookieInjectionFailure,
    /// The awaited element never matched within its timeout.
    ElementWaitFailure,
    /// Navigating or printing the page failed.
    GenerationFailure,
    /// The browser process misbehaved in an unclassified way.
    UnhandledEngineFault,
    /// The request failed validation.
    InvalidRequest,
    /// The worker is shutting down and no longer renders.
    ShuttingDown,
}

impl ErrorKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pdfvisor::ErrorKind;
    ///
    /// assert_eq!(ErrorKind::QueueFull.as_label(), "queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ClientDropped => "client_dropped",
            ErrorKind::CookieInjectionFailure => "cookie_injection_failure",
            ErrorKind::ElementWaitFailure => "element_wait_failure",
            ErrorKind::GenerationFailure => "generation_failure",
            ErrorKind::UnhandledEngineFault => "unhandled_engine_fault",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ShuttingDown => "shutting_down",
        }
    }

    /// HTTP-style status code used on the RPC boundary.
    ///
    /// `429` is the only code the dispatcher retries.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::QueueFull => 429,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::ClientDropped => 499,
            ErrorKind::ShuttingDown => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::CookieInjectionFailure
            | ErrorKind::ElementWaitFailure
            | ErrorKind::GenerationFailure
            | ErrorKind::UnhandledEngineFault => 500,
        }
    }

    /// Indicates whether the caller may retry the same request.
    ///
    /// Only [`ErrorKind::QueueFull`] is transient overload; everything else is a
    /// worker-side or content-side fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::QueueFull)
    }

    fn describe(&self) -> &'static str {
        match self {
            ErrorKind::QueueFull => "request queue full",
            ErrorKind::Timeout => "render timed out",
            ErrorKind::ClientDropped => "client dropped the request",
            ErrorKind::CookieInjectionFailure => "failed to set cookies",
            ErrorKind::ElementWaitFailure => "element not ready",
            ErrorKind::GenerationFailure => "failed to generate PDF",
            ErrorKind::UnhandledEngineFault => "unhandled browser error",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::ShuttingDown => "worker shutting down",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// # A classified render failure.
///
/// Carries the [`ErrorKind`], an optional human-readable detail and an optional
/// wrapped cause (reachable through [`std::error::Error::source`]). Pool-level
/// context (`slot`, `session`) is attached without touching the kind.
#[derive(Error, Debug)]
#[error("{kind}{}", detail_suffix(.detail, .source))]
pub struct RenderError {
    kind: ErrorKind,
    detail: Option<String>,
    #[source]
    source: Option<BoxError>,
    slot: Option<i32>,
    session: Option<u64>,
}

fn detail_suffix(detail: &Option<String>, source: &Option<BoxError>) -> String {
    match (detail, source) {
        (Some(d), Some(s)) => format!(": {d}: {s}"),
        (Some(d), None) => format!(": {d}"),
        (None, Some(s)) => format!(": {s}"),
        (None, None) => String::new(),
    }
}

impl RenderError {
    /// Creates an error of the given kind without detail or cause.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            detail: None,
            source: None,
            slot: None,
            session: None,
        }
    }

    /// Attaches a human-readable detail (e.g. the selector that never appeared).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches the slot that produced the error.
    pub fn with_slot(mut self, slot: i32) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Attaches the session that produced the error.
    pub fn with_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }

    /// Shorthand for `RenderError::new(ErrorKind::QueueFull)`.
    pub fn queue_full() -> Self {
        Self::new(ErrorKind::QueueFull)
    }

    /// Shorthand for a [`ErrorKind::ClientDropped`] error.
    pub fn client_dropped() -> Self {
        Self::new(ErrorKind::ClientDropped)
    }

    /// Shorthand for an [`ErrorKind::InvalidRequest`] error with detail.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest).with_detail(detail)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn slot(&self) -> Option<i32> {
        self.slot
    }

    pub fn session(&self) -> Option<u64> {
        self.session
    }

    /// Returns the stable label of the kind.
    pub fn as_label(&self) -> &'static str {
        self.kind.as_label()
    }

    /// Returns the RPC status code of the kind.
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// See [`ErrorKind::is_retryable`].
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<ErrorKind> for RenderError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// # Errors produced by the pdfvisor runtime.
///
/// These represent failures in the pool runtime itself,
/// such as a shutdown sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some sessions were still rendering and get abandoned.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Sessions that did not finish in time (`slot/session` descriptors).
        stuck: Vec<String>,
    },

    /// The pool could not start its browser slots.
    #[error("pool startup failed: {0}")]
    Startup(#[source] RenderError),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use pdfvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Startup(_) => "runtime_startup_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_includes_detail_and_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = RenderError::new(ErrorKind::ElementWaitFailure)
            .with_detail("element \"#ready\"")
            .with_source(cause);

        assert_eq!(
            err.to_string(),
            "element not ready: element \"#ready\": socket closed"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn context_does_not_change_kind() {
        let err = RenderError::new(ErrorKind::GenerationFailure)
            .with_slot(1)
            .with_session(42);
        assert_eq!(err.kind(), ErrorKind::GenerationFailure);
        assert_eq!(err.slot(), Some(1));
        assert_eq!(err.session(), Some(42));
        assert_eq!(err.to_string(), "failed to generate PDF");
    }

    #[test]
    fn only_queue_full_is_retryable() {
        let kinds = [
            ErrorKind::Timeout,
            ErrorKind::ClientDropped,
            ErrorKind::CookieInjectionFailure,
            ErrorKind::ElementWaitFailure,
            ErrorKind::GenerationFailure,
            ErrorKind::UnhandledEngineFault,
            ErrorKind::InvalidRequest,
            ErrorKind::ShuttingDown,
        ];
        assert!(ErrorKind::QueueFull.is_retryable());
        for kind in kinds {
            assert!(!kind.is_retryable(), "{kind:?} must not be retryable");
        }
    }

    #[test]
    fn status_codes_mirror_http_classes() {
        assert_eq!(ErrorKind::QueueFull.status_code(), 429);
        assert_eq!(ErrorKind::InvalidRequest.status_code(), 400);
        assert_eq!(ErrorKind::UnhandledEngineFault.status_code(), 500);
        assert!(ErrorKind::Timeout.status_code() >= 500);
    }
}
