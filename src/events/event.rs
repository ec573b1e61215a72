//! # Telemetry events emitted by the pool, the dispatcher and the shutdown host.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Admission events**: queueing and rejection at the pool boundary
//! - **Session events**: one render on one slot (start, completion, cleanup)
//! - **Slot events**: recycling and process restarts
//! - **Process events**: shutdown phases, connectivity, dispatcher retries
//!
//! The [`Event`] struct carries optional metadata such as slot id, session id,
//! queue depth, error counters and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use pdfvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RequestQueued)
//!     .with_queue(3, 8)
//!     .with_url("https://app.example/print");
//!
//! assert_eq!(ev.kind, EventKind::RequestQueued);
//! assert_eq!(ev.queue_depth, Some(3));
//! assert_eq!(ev.queue_capacity, Some(8));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name>` plus panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> reason=<full|closed>`
    SubscriberOverflow,

    // === Admission events ===
    /// Request waits in the admission queue.
    ///
    /// Sets:
    /// - `queue_depth` / `queue_capacity`: after enqueueing
    /// - `url`: target page
    RequestQueued,

    /// Request rejected because every slot is busy and the queue is full.
    ///
    /// Sets:
    /// - `queue_depth` / `queue_capacity`
    /// - `url`
    RequestRejected,

    /// Queued request left the queue without being served (cancelled or shutdown).
    ///
    /// Sets:
    /// - `queue_depth` / `queue_capacity`: after removal
    /// - `reason`
    RequestAbandoned,

    // === Session events ===
    /// A session started rendering on a slot.
    ///
    /// Sets:
    /// - `slot`, `session`, `url`
    /// - `queue_depth` / `queue_capacity`: at admission time
    SessionStarted,

    /// A session produced a PDF.
    ///
    /// Sets:
    /// - `slot`, `session`, `elapsed_ms`
    /// - `console_errors` / `browser_errors`
    SessionCompleted,

    /// A session failed.
    ///
    /// Sets:
    /// - `slot`, `session`, `elapsed_ms`
    /// - `reason`: error label and message
    /// - `console_errors` / `browser_errors`
    SessionFailed,

    /// Post-render cleanup finished (successfully, failed, or skipped).
    ///
    /// Sets:
    /// - `slot`, `session`
    /// - `attempt`: cleanup attempts made
    /// - `reason`: `succeeded` | `failed` | `skipped`
    CleanupFinished,

    // === Slot events ===
    /// A slot exceeded its age limit and is being replaced.
    ///
    /// Sets:
    /// - `slot`, `elapsed_ms`: slot age
    SlotRecycled,

    /// A slot process was (re)started.
    ///
    /// Sets:
    /// - `slot`
    /// - `attempt`: start attempt number
    /// - `reason`: why the slot was restarted
    SlotRestarted,

    /// Starting a slot process failed; another attempt follows after `delay_ms`.
    ///
    /// Sets:
    /// - `slot`, `attempt`, `delay_ms`, `reason`
    SlotRestartFailed,

    // === Process events ===
    /// The shutdown host advanced to a new phase.
    ///
    /// Sets:
    /// - `reason`: phase label
    ShutdownPhaseChanged,

    /// The connectivity monitor observed a state change.
    ///
    /// Sets:
    /// - `reason`: new state label
    ConnectivityChanged,

    /// The dispatcher will retry after an overload rejection.
    ///
    /// Sets:
    /// - `attempt`: attempt that was rejected
    /// - `delay_ms`: sleep before the next attempt
    /// - `url`
    RetryScheduled,

    /// In-flight sessions did not finish within the shutdown grace period.
    ///
    /// Sets:
    /// - `reason`: stuck session descriptors
    GraceExceeded,
}

/// Telemetry event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Slot id (`-1` is the warm-up slot).
    pub slot: Option<i32>,
    /// Session id.
    pub session: Option<u64>,
    /// Target page of the request.
    pub url: Option<Arc<str>>,
    /// Admission queue depth.
    pub queue_depth: Option<u32>,
    /// Admission queue capacity.
    pub queue_capacity: Option<u32>,
    /// Console errors observed during a session.
    pub console_errors: Option<u32>,
    /// Browser log errors observed during a session.
    pub browser_errors: Option<u32>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Elapsed time in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Human-readable reason (errors, phases, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            slot: None,
            session: None,
            url: None,
            queue_depth: None,
            queue_capacity: None,
            console_errors: None,
            browser_errors: None,
            attempt: None,
            delay_ms: None,
            elapsed_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_slot(mut self, slot: i32) -> Self {
        self.slot = Some(slot);
        self
    }

    #[inline]
    pub fn with_session(mut self, session: u64) -> Self {
        self.session = Some(session);
        self
    }

    #[inline]
    pub fn with_url(mut self, url: impl Into<Arc<str>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attaches queue depth and capacity.
    #[inline]
    pub fn with_queue(mut self, depth: usize, capacity: usize) -> Self {
        self.queue_depth = Some(depth.min(u32::MAX as usize) as u32);
        self.queue_capacity = Some(capacity.min(u32::MAX as usize) as u32);
        self
    }

    /// Attaches console and browser error counters.
    #[inline]
    pub fn with_error_counts(mut self, console: u32, browser: u32) -> Self {
        self.console_errors = Some(console);
        self.browser_errors = Some(browser);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}
