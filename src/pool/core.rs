//! # Worker pool: admission, render sessions and slot lifecycle.
//!
//! [`WorkerPool`] owns a fixed number of browser slots and a bounded FIFO
//! admission queue. Every accepted request becomes one *session* bound to
//! exactly one slot; the slot returns to the pool only after cleanup.
//!
//! ```text
//! submit(req, cancel)
//!   ├─ free slot?   ──► take lowest id ────────────────┐
//!   ├─ queue room?  ──► wait (FIFO, cancellable) ──────┤
//!   └─ otherwise    ──► QueueFull (immediately)        │
//!                                                      ▼
//!                      render task (tracked, outlives the caller)
//!                        generate ─► respond ─► cleanup (retried)
//!                                                      │
//!                 ┌───────── restart? ─────────────────┤
//!                 ▼                                    ▼
//!       close + start (backoff)            release: oldest waiter or free set
//! ```
//!
//! ## Rules
//! - Admission is decided synchronously; `QueueFull` never waits.
//! - A slot serves at most one session at a time (`Box<dyn Renderer>` moves).
//! - The caller is answered before cleanup; cleanup never observes the caller's cancellation.
//! - A waiter that gives up never strands a slot: a slot handed to it is released again.
//! - After [`WorkerPool::shutdown`] no session starts; waiters get `ShuttingDown`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::core::{ShutdownHost, ShutdownPhase};
use crate::error::{ErrorKind, RenderError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::types::{BrowserVersion, RenderRequest, RenderResult};

use super::config::PoolConfig;
use super::queue::AdmissionQueue;
use super::renderer::{RenderContext, RendererFactory};
use super::session::{CleanupOutcome, Session};
use super::slot::{Slot, SlotStatus, WARMUP_SLOT};

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots with a running or starting browser.
    pub slots: usize,
    pub idle: usize,
    /// Generating or cleaning up.
    pub busy: usize,
    pub restarting: usize,
    pub queued: usize,
    pub queue_capacity: usize,
    /// Sessions that have not finished cleanup.
    pub in_flight: usize,
}

struct State {
    free: BTreeMap<i32, Slot>,
    statuses: BTreeMap<i32, SlotStatus>,
    queue: AdmissionQueue<Slot>,
    next_ticket: u64,
    in_flight: HashMap<u64, String>,
    closed: bool,
}

struct Inner {
    config: PoolConfig,
    factory: Arc<dyn RendererFactory>,
    bus: Bus,
    host: Option<ShutdownHost>,
    state: Mutex<State>,
    next_session: AtomicU64,
    version: OnceLock<BrowserVersion>,
    started: AtomicBool,
    closing: CancellationToken,
    tracker: TaskTracker,
}

enum Admission {
    Assigned(Slot, usize),
    Queued(u64, oneshot::Receiver<Slot>, usize),
}

/// Pool of browser slots behind a bounded FIFO admission queue.
///
/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Creates a pool. No browser runs until [`WorkerPool::start`].
    ///
    /// When `host` is given, health turns negative once shutdown passes the
    /// readiness drain.
    pub fn new(
        factory: Arc<dyn RendererFactory>,
        config: PoolConfig,
        bus: Bus,
        host: Option<ShutdownHost>,
    ) -> Self {
        let capacity = config.queue_capacity;
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                bus,
                host,
                state: Mutex::new(State {
                    free: BTreeMap::new(),
                    statuses: BTreeMap::new(),
                    queue: AdmissionQueue::new(capacity),
                    next_ticket: 0,
                    in_flight: HashMap::new(),
                    closed: false,
                }),
                next_session: AtomicU64::new(1),
                version: OnceLock::new(),
                started: AtomicBool::new(false),
                closing: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Reads the engine version from a warm-up browser, then starts every slot.
    ///
    /// Slots start concurrently. Any failure aborts startup; slots that did
    /// start stay in the pool until [`WorkerPool::shutdown`].
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let inner = &self.inner;

        let mut warmup = inner.factory.start(WARMUP_SLOT).await.map_err(RuntimeError::Startup)?;
        let version = warmup.version().await;
        warmup.close().await;
        let version = version.map_err(RuntimeError::Startup)?;
        info!(
            product = %version.product,
            revision = %version.revision,
            protocol = %version.protocol_version,
            "browser version"
        );
        let _ = inner.version.set(version);

        let slots = inner.config.slots();
        let started = join_all((0..slots).map(|id| inner.factory.start(id as i32))).await;

        let mut failure = None;
        for result in started {
            match result {
                Ok(renderer) => inner.release(Slot::new(renderer)),
                Err(err) => {
                    warn!(error = %err, "slot failed to start");
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            return Err(RuntimeError::Startup(err));
        }

        inner.started.store(true, Ordering::Release);
        inner.spawn_recycler();
        info!(slots, queue_capacity = inner.config.queue_capacity, "worker pool started");
        Ok(())
    }

    /// Whether startup (warm-up and every slot) completed.
    pub fn startup_complete(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Version read during startup (default until then).
    pub fn version(&self) -> BrowserVersion {
        self.inner.browser_version()
    }

    /// Renders `request` on the first available slot.
    ///
    /// Fails fast with `QueueFull` when every slot is busy and the queue is
    /// full. Cancelling `cancel` (or dropping the returned future) while
    /// waiting leaves the queue; while rendering it aborts the render with
    /// `ClientDropped`, and the slot still goes through cleanup. Once the
    /// host's hard shutdown window has cancelled the server context, either
    /// case reports `ShuttingDown` instead.
    pub async fn submit(
        &self,
        request: Arc<RenderRequest>,
        cancel: CancellationToken,
    ) -> Result<RenderResult, RenderError> {
        request.validate()?;
        let origin = request.origin()?;
        let url: Arc<str> = Arc::from(request.url.as_str());

        let (slot, depth) = match self.inner.admit(&url)? {
            Admission::Assigned(slot, depth) => (slot, depth),
            Admission::Queued(ticket, rx, depth) => {
                let mut waiter = QueuedWaiter {
                    inner: &self.inner,
                    ticket,
                    rx: Some(rx),
                };
                let slot = tokio::select! {
                    res = waiter.recv() => res?,
                    _ = cancel.cancelled() => {
                        return Err(self.inner.reclassify(RenderError::client_dropped()));
                    }
                };
                (slot, depth)
            }
        };

        let token = cancel.child_token();
        let _abort_on_drop = token.clone().drop_guard();
        let rx = self.inner.spawn_session(slot, request, origin, url, token, depth);
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RenderError::new(ErrorKind::UnhandledEngineFault)
                .with_detail("render task ended without a result")),
        }
    }

    /// True while at least one slot is usable and shutdown has not passed
    /// the readiness drain.
    pub fn health(&self) -> bool {
        let inner = &self.inner;
        if !self.startup_complete() || inner.closing.is_cancelled() {
            return false;
        }
        if let Some(host) = &inner.host {
            if host.phase() > ShutdownPhase::DrainingReadiness {
                return false;
            }
        }
        let st = inner.state.lock();
        !st.closed && st.statuses.values().any(|s| *s != SlotStatus::Restarting)
    }

    pub fn stats(&self) -> PoolStats {
        let st = self.inner.state.lock();
        let mut stats = PoolStats {
            slots: st.statuses.len(),
            queued: st.queue.len(),
            queue_capacity: st.queue.capacity(),
            in_flight: st.in_flight.len(),
            ..PoolStats::default()
        };
        for status in st.statuses.values() {
            match status {
                SlotStatus::Idle => stats.idle += 1,
                SlotStatus::Generating | SlotStatus::CleaningUp => stats.busy += 1,
                SlotStatus::Restarting => stats.restarting += 1,
            }
        }
        stats
    }

    /// Status of each slot by id.
    pub fn slot_statuses(&self) -> BTreeMap<i32, SlotStatus> {
        self.inner.state.lock().statuses.clone()
    }

    /// Stops admission, fails waiters, closes idle slots and waits up to
    /// `grace` for in-flight sessions.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] listing the sessions still
    /// running when `grace` elapses. Their slots are closed as they finish.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), RuntimeError> {
        let inner = &self.inner;
        inner.closing.cancel();

        let (waiters, idle, capacity) = {
            let mut st = inner.state.lock();
            st.closed = true;
            let waiters = st.queue.drain();
            let idle = std::mem::take(&mut st.free);
            for id in idle.keys() {
                st.statuses.remove(id);
            }
            (waiters, idle, st.queue.capacity())
        };

        for _ in 0..waiters.len() {
            inner.bus.publish(
                Event::new(EventKind::RequestAbandoned)
                    .with_queue(0, capacity)
                    .with_reason("shutting down"),
            );
        }
        drop(waiters);

        join_all(
            idle.into_values()
                .map(|mut slot| async move { slot.renderer.close().await }),
        )
        .await;

        inner.tracker.close();
        match tokio::time::timeout(grace, inner.tracker.wait()).await {
            Ok(()) => {
                info!("worker pool stopped");
                Ok(())
            }
            Err(_) => {
                let mut stuck: Vec<String> =
                    inner.state.lock().in_flight.values().cloned().collect();
                stuck.sort();
                inner
                    .bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

/// A request waiting in the admission queue.
///
/// Dropping it before a slot arrives removes the ticket; if a slot was handed
/// over concurrently it is released again.
struct QueuedWaiter<'a> {
    inner: &'a Arc<Inner>,
    ticket: u64,
    rx: Option<oneshot::Receiver<Slot>>,
}

impl QueuedWaiter<'_> {
    async fn recv(&mut self) -> Result<Slot, RenderError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(RenderError::new(ErrorKind::ShuttingDown));
        };
        let res = rx.await;
        self.rx = None;
        res.map_err(|_| {
            RenderError::new(ErrorKind::ShuttingDown).with_detail("pool closed while queued")
        })
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            self.inner.abandon(self.ticket, &mut rx);
        }
    }
}

impl Inner {
    fn browser_version(&self) -> BrowserVersion {
        self.version.get().cloned().unwrap_or_default()
    }

    fn admit(&self, url: &Arc<str>) -> Result<Admission, RenderError> {
        let mut st = self.state.lock();
        if st.closed {
            return Err(RenderError::new(ErrorKind::ShuttingDown));
        }
        let capacity = st.queue.capacity();

        if let Some((id, slot)) = st.free.pop_first() {
            st.statuses.insert(id, SlotStatus::Generating);
            return Ok(Admission::Assigned(slot, st.queue.len()));
        }

        let ticket = st.next_ticket;
        st.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        match st.queue.try_push(ticket, tx) {
            Ok(()) => {
                let depth = st.queue.len();
                drop(st);
                self.bus.publish(
                    Event::new(EventKind::RequestQueued)
                        .with_queue(depth, capacity)
                        .with_url(url.clone()),
                );
                Ok(Admission::Queued(ticket, rx, depth))
            }
            Err(_) => {
                let depth = st.queue.len();
                drop(st);
                self.bus.publish(
                    Event::new(EventKind::RequestRejected)
                        .with_queue(depth, capacity)
                        .with_url(url.clone()),
                );
                let detail = format!("{depth}/{capacity} requests queued");
                Err(RenderError::queue_full().with_detail(detail))
            }
        }
    }

    fn abandon(self: &Arc<Self>, ticket: u64, rx: &mut oneshot::Receiver<Slot>) {
        let (removed, depth, capacity) = {
            let mut st = self.state.lock();
            let removed = st.queue.remove(ticket);
            (removed, st.queue.len(), st.queue.capacity())
        };
        if removed {
            self.bus.publish(
                Event::new(EventKind::RequestAbandoned)
                    .with_queue(depth, capacity)
                    .with_reason("cancelled while queued"),
            );
            return;
        }
        rx.close();
        if let Ok(slot) = rx.try_recv() {
            debug!(slot = slot.id, ticket, "slot handed to a cancelled waiter, releasing");
            self.release(slot);
        }
    }

    /// Returns a slot to the oldest live waiter or to the free set.
    fn release(self: &Arc<Self>, slot: Slot) {
        let mut st = self.state.lock();
        let id = slot.id;
        if st.closed {
            st.statuses.remove(&id);
            drop(st);
            self.tracker.spawn(async move {
                let mut slot = slot;
                slot.renderer.close().await;
            });
            return;
        }
        match st.queue.hand_over(slot) {
            None => {
                st.statuses.insert(id, SlotStatus::Generating);
            }
            Some(slot) => {
                st.statuses.insert(id, SlotStatus::Idle);
                st.free.insert(id, slot);
            }
        }
    }

    /// A cancellation caused by the host's hard shutdown window is reported
    /// as `ShuttingDown`, not as a caller that went away.
    fn reclassify(&self, err: RenderError) -> RenderError {
        let forced = self
            .host
            .as_ref()
            .is_some_and(|host| host.server_context().is_cancelled());
        if err.kind() != ErrorKind::ClientDropped || !forced {
            return err;
        }
        let mut out = RenderError::new(ErrorKind::ShuttingDown)
            .with_detail("render cancelled by forced shutdown");
        if let Some(slot) = err.slot() {
            out = out.with_slot(slot);
        }
        if let Some(session) = err.session() {
            out = out.with_session(session);
        }
        out
    }

    fn set_status(&self, id: i32, status: SlotStatus) {
        self.state.lock().statuses.insert(id, status);
    }

    fn spawn_session(
        self: &Arc<Self>,
        slot: Slot,
        request: Arc<RenderRequest>,
        origin: String,
        url: Arc<str>,
        token: CancellationToken,
        depth: usize,
    ) -> oneshot::Receiver<Result<RenderResult, RenderError>> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, slot.id, url, origin));
        self.state.lock().in_flight.insert(id, session.to_string());

        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            inner.run_session(slot, session, request, token, depth, tx).await;
        });
        rx
    }

    async fn run_session(
        self: Arc<Self>,
        mut slot: Slot,
        session: Arc<Session>,
        request: Arc<RenderRequest>,
        token: CancellationToken,
        depth: usize,
        respond: oneshot::Sender<Result<RenderResult, RenderError>>,
    ) {
        let timeout = self.config.render_timeout;
        self.bus.publish(
            Event::new(EventKind::SessionStarted)
                .with_slot(slot.id)
                .with_session(session.id())
                .with_url(session.url().clone())
                .with_queue(depth, self.config.queue_capacity),
        );

        let ctx = RenderContext::new(token, timeout);
        let render = slot.renderer.generate(&session, &request, &ctx);
        let outcome = match tokio::time::timeout(timeout, render).await {
            Ok(res) => res,
            Err(_) => Err(RenderError::new(ErrorKind::Timeout)
                .with_detail(format!("render exceeded {timeout:?}"))),
        }
        .map_err(|err| self.reclassify(err).with_slot(slot.id).with_session(session.id()));

        let failure = outcome.as_ref().err().map(RenderError::kind);
        match &outcome {
            Ok(_) => {
                self.bus.publish(
                    Event::new(EventKind::SessionCompleted)
                        .with_slot(slot.id)
                        .with_session(session.id())
                        .with_elapsed(session.elapsed())
                        .with_error_counts(session.console_errors(), session.browser_errors()),
                );
            }
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::SessionFailed)
                        .with_slot(slot.id)
                        .with_session(session.id())
                        .with_elapsed(session.elapsed())
                        .with_error_counts(session.console_errors(), session.browser_errors())
                        .with_reason(format!("{}: {err}", err.as_label())),
                );
            }
        }
        let _ = respond.send(outcome.map(|data| RenderResult {
            data,
            browser: self.browser_version(),
        }));

        self.set_status(slot.id, SlotStatus::CleaningUp);
        let cleanup_ok = self.cleanup(&mut slot, &session).await;
        self.state.lock().in_flight.remove(&session.id());

        if self.config.fault_policy.requires_restart(failure, session.touched(), cleanup_ok) {
            let reason = match failure {
                _ if !cleanup_ok => "cleanup failed".to_string(),
                Some(kind) => format!("render failed: {}", kind.as_label()),
                None => "restart".to_string(),
            };
            self.restart(slot, &reason).await;
        } else if slot.is_due(self.config.restart_interval()) {
            self.recycle(slot).await;
        } else {
            self.release(slot);
        }
    }

    async fn cleanup(&self, slot: &mut Slot, session: &Session) -> bool {
        let (outcome, ok) = if !session.touched() {
            (CleanupOutcome::Skipped, true)
        } else {
            let mut ok = false;
            for _ in 0..self.config.cleanup_attempts() {
                let attempt = session.record_cleanup_attempt();
                match slot.renderer.cleanup(session).await {
                    Ok(()) => {
                        ok = true;
                        break;
                    }
                    Err(err) => warn!(%session, attempt, error = %err, "cleanup failed"),
                }
            }
            let outcome = if ok {
                CleanupOutcome::Succeeded
            } else {
                CleanupOutcome::Failed
            };
            (outcome, ok)
        };
        session.finish_cleanup(outcome);
        self.bus.publish(
            Event::new(EventKind::CleanupFinished)
                .with_slot(slot.id)
                .with_session(session.id())
                .with_attempt(session.cleanup_attempts())
                .with_reason(outcome.as_label()),
        );
        ok
    }

    async fn recycle(self: &Arc<Self>, slot: Slot) {
        self.bus.publish(
            Event::new(EventKind::SlotRecycled)
                .with_slot(slot.id)
                .with_elapsed(slot.age()),
        );
        self.restart(slot, "recycle").await;
    }

    /// Replaces the slot's browser, retrying with backoff until it starts or
    /// the pool closes.
    async fn restart(self: &Arc<Self>, mut slot: Slot, reason: &str) {
        let id = slot.id;
        self.set_status(id, SlotStatus::Restarting);
        slot.renderer.close().await;
        drop(slot);

        let mut attempt: u32 = 0;
        loop {
            if self.closing.is_cancelled() {
                self.retire(id);
                return;
            }
            attempt += 1;
            match self.factory.start(id).await {
                Ok(renderer) => {
                    self.bus.publish(
                        Event::new(EventKind::SlotRestarted)
                            .with_slot(id)
                            .with_attempt(attempt)
                            .with_reason(reason.to_string()),
                    );
                    self.release(Slot::new(renderer));
                    return;
                }
                Err(err) => {
                    let delay = self.config.restart_backoff.next(attempt - 1);
                    self.bus.publish(
                        Event::new(EventKind::SlotRestartFailed)
                            .with_slot(id)
                            .with_attempt(attempt)
                            .with_delay(delay)
                            .with_reason(err.to_string()),
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.closing.cancelled() => {
                            self.retire(id);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn retire(&self, id: i32) {
        self.state.lock().statuses.remove(&id);
        debug!(slot = id, "slot retired");
    }

    fn spawn_recycler(self: &Arc<Self>) {
        let Some(limit) = self.config.restart_interval() else {
            return;
        };
        let tick = self.config.recycle_check_interval.max(Duration::from_millis(10));
        let closing = self.closing.clone();
        let weak: Weak<Inner> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    _ = closing.cancelled() => break,
                }
                let Some(inner) = weak.upgrade() else { break };
                inner.recycle_one(limit).await;
            }
        });
    }

    /// Replaces the lowest-id idle slot older than `limit`, if any.
    async fn recycle_one(self: &Arc<Self>, limit: Duration) {
        let due = {
            let mut st = self.state.lock();
            if st.closed {
                return;
            }
            let id = st
                .free
                .iter()
                .find(|(_, slot)| slot.is_due(Some(limit)))
                .map(|(id, _)| *id);
            match id.and_then(|id| st.free.remove(&id)) {
                Some(slot) => {
                    st.statuses.insert(slot.id, SlotStatus::Restarting);
                    slot
                }
                None => return,
            }
        };
        self.recycle(due).await;
    }
}
