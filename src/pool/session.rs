//! Per-render bookkeeping shared between the pool and the renderer.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// How post-render cleanup ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Pending,
    Succeeded,
    Failed,
    /// The session never touched the browser.
    Skipped,
}

impl CleanupOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            CleanupOutcome::Pending => "pending",
            CleanupOutcome::Succeeded => "succeeded",
            CleanupOutcome::Failed => "failed",
            CleanupOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug)]
struct CleanupRecord {
    attempts: u32,
    outcome: CleanupOutcome,
}

/// One (request, slot) pair.
#[derive(Debug)]
pub struct Session {
    id: u64,
    slot: i32,
    url: Arc<str>,
    origin: String,
    started_at: Instant,
    touched: AtomicBool,
    console_errors: AtomicU32,
    browser_errors: AtomicU32,
    cleanup: Mutex<CleanupRecord>,
}

impl Session {
    pub fn new(id: u64, slot: i32, url: impl Into<Arc<str>>, origin: impl Into<String>) -> Self {
        Self {
            id,
            slot,
            url: url.into(),
            origin: origin.into(),
            started_at: Instant::now(),
            touched: AtomicBool::new(false),
            console_errors: AtomicU32::new(0),
            browser_errors: AtomicU32::new(0),
            cleanup: Mutex::new(CleanupRecord {
                attempts: 0,
                outcome: CleanupOutcome::Pending,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }

    pub fn url(&self) -> &Arc<str> {
        &self.url
    }

    /// `scheme://host[:port]` of the target page.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Records that the browser was sent a state-changing command.
    pub fn mark_touched(&self) {
        self.touched.store(true, Ordering::Release);
    }

    pub fn touched(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    pub fn record_console_error(&self) {
        self.console_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_browser_error(&self) {
        self.browser_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn console_errors(&self) -> u32 {
        self.console_errors.load(Ordering::Relaxed)
    }

    pub fn browser_errors(&self) -> u32 {
        self.browser_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn record_cleanup_attempt(&self) -> u32 {
        let mut rec = self.cleanup.lock();
        rec.attempts += 1;
        rec.attempts
    }

    pub(crate) fn finish_cleanup(&self, outcome: CleanupOutcome) {
        self.cleanup.lock().outcome = outcome;
    }

    pub fn cleanup_attempts(&self) -> u32 {
        self.cleanup.lock().attempts
    }

    pub fn cleanup_outcome(&self) -> CleanupOutcome {
        self.cleanup.lock().outcome
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot={} session={} url={}", self.slot, self.id, self.url)
    }
}
