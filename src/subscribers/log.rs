//! # Logging subscriber.
//!
//! [`LogWriter`] turns telemetry events into `tracing` records. Enabled via the
//! `logging` feature (on by default). Pool, shutdown and dispatcher events are
//! logged here only, never again at the publishing site.
//!
//! ## Output
//! ```text
//! INFO  session started slot=0 session=12 queue_depth=1 queue_capacity=4 url=https://...
//! WARN  session failed slot=0 session=12 elapsed_ms=30001 reason="timeout: render timed out"
//! INFO  shutdown phase changed phase=draining_readiness
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Writes every event through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let url = e.url.as_deref().unwrap_or("");
        match e.kind {
            EventKind::RequestQueued => {
                debug!(
                    queue_depth = ?e.queue_depth,
                    queue_capacity = ?e.queue_capacity,
                    url,
                    "request queued"
                );
            }
            EventKind::RequestRejected => {
                warn!(
                    queue_depth = ?e.queue_depth,
                    queue_capacity = ?e.queue_capacity,
                    url,
                    "request rejected: queue full"
                );
            }
            EventKind::RequestAbandoned => {
                debug!(queue_depth = ?e.queue_depth, reason, "queued request abandoned");
            }
            EventKind::SessionStarted => {
                info!(
                    slot = ?e.slot,
                    session = ?e.session,
                    queue_depth = ?e.queue_depth,
                    queue_capacity = ?e.queue_capacity,
                    url,
                    "session started"
                );
            }
            EventKind::SessionCompleted => {
                info!(
                    slot = ?e.slot,
                    session = ?e.session,
                    elapsed_ms = ?e.elapsed_ms,
                    console_errors = ?e.console_errors,
                    browser_errors = ?e.browser_errors,
                    "session completed"
                );
            }
            EventKind::SessionFailed => {
                warn!(
                    slot = ?e.slot,
                    session = ?e.session,
                    elapsed_ms = ?e.elapsed_ms,
                    console_errors = ?e.console_errors,
                    browser_errors = ?e.browser_errors,
                    reason,
                    "session failed"
                );
            }
            EventKind::CleanupFinished => {
                debug!(
                    slot = ?e.slot,
                    session = ?e.session,
                    attempts = ?e.attempt,
                    outcome = reason,
                    "cleanup finished"
                );
            }
            EventKind::SlotRecycled => {
                info!(slot = ?e.slot, age_ms = ?e.elapsed_ms, "slot recycled");
            }
            EventKind::SlotRestarted => {
                info!(slot = ?e.slot, attempt = ?e.attempt, reason, "slot restarted");
            }
            EventKind::SlotRestartFailed => {
                warn!(
                    slot = ?e.slot,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    reason,
                    "slot restart failed"
                );
            }
            EventKind::ShutdownPhaseChanged => {
                info!(phase = reason, "shutdown phase changed");
            }
            // The monitor logs its own transitions together with the probe error.
            EventKind::ConnectivityChanged => {}
            EventKind::RetryScheduled => {
                debug!(attempt = ?e.attempt, delay_ms = ?e.delay_ms, url, "retry scheduled");
            }
            EventKind::GraceExceeded => {
                warn!(stuck = reason, "sessions still running after grace period");
            }
            EventKind::SubscriberOverflow => {
                warn!(reason, "subscriber queue overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
