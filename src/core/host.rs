//! # ShutdownHost: staged graceful shutdown shared by the proxy and the worker.
//!
//! ```text
//! Running ──signal/trigger()──► SignalReceived
//!                                   │ (readiness_drain_delay: readiness probe fails, traffic drains)
//!                                   ▼
//!                           DrainingReadiness ──► ShuttingDownServer (listeners stop accepting)
//!                                                      │
//!                       server_stopped() within        │        shutdown_period expired
//!                       shutdown_period ◄──────────────┴──────────► HardShutdownWindow
//!                             │                                        │ (server_context cancelled)
//!                             ▼                                        ▼ (shutdown_hard_period)
//!                         Terminated ◄──────────────────────────── Terminated
//! ```
//!
//! ## Rules
//! - The phase only moves forward: it lives in an `AtomicU8` advanced with `fetch_max`.
//! - Every boundary is an independent [`CancellationToken`]; reaching a phase
//!   fires the tokens of every phase up to it, so jumps never skip a token.
//! - `is_shutting_down()` is true from the moment the signal is observed.
//! - Each transition is logged and published as `ShutdownPhaseChanged`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{Bus, Event, EventKind};

use super::config::ShutdownConfig;
use super::shutdown::wait_for_shutdown_signal;

/// Shutdown phase, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ShutdownPhase {
    Running = 0,
    SignalReceived = 1,
    DrainingReadiness = 2,
    ShuttingDownServer = 3,
    HardShutdownWindow = 4,
    Terminated = 5,
}

impl ShutdownPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::SignalReceived,
            2 => ShutdownPhase::DrainingReadiness,
            3 => ShutdownPhase::ShuttingDownServer,
            4 => ShutdownPhase::HardShutdownWindow,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownPhase::Running => "running",
            ShutdownPhase::SignalReceived => "signal_received",
            ShutdownPhase::DrainingReadiness => "draining_readiness",
            ShutdownPhase::ShuttingDownServer => "shutting_down_server",
            ShutdownPhase::HardShutdownWindow => "hard_shutdown_window",
            ShutdownPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

struct Inner {
    config: ShutdownConfig,
    bus: Bus,
    phase: AtomicU8,
    tx: watch::Sender<ShutdownPhase>,

    signal_received: CancellationToken,
    readiness_drained: CancellationToken,
    stop_accepting: CancellationToken,
    server_context: CancellationToken,
    terminated: CancellationToken,
    server_stopped: CancellationToken,
}

/// Staged shutdown state machine.
///
/// Cheap to clone; all clones share one phase.
#[derive(Clone)]
pub struct ShutdownHost {
    inner: Arc<Inner>,
}

impl ShutdownHost {
    /// Creates a host in [`ShutdownPhase::Running`]. Nothing happens until
    /// [`spawn`](Self::spawn) (or [`spawn_manual`](Self::spawn_manual)) starts the driver.
    pub fn new(config: ShutdownConfig, bus: Bus) -> Self {
        let (tx, _rx) = watch::channel(ShutdownPhase::Running);
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                phase: AtomicU8::new(ShutdownPhase::Running as u8),
                tx,
                signal_received: CancellationToken::new(),
                readiness_drained: CancellationToken::new(),
                stop_accepting: CancellationToken::new(),
                server_context: CancellationToken::new(),
                terminated: CancellationToken::new(),
                server_stopped: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.inner.config
    }

    /// Current phase.
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// True from the instant a shutdown signal is observed.
    pub fn is_shutting_down(&self) -> bool {
        self.phase() >= ShutdownPhase::SignalReceived
    }

    /// Watches phase changes.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.inner.tx.subscribe()
    }

    /// Fires at `SignalReceived`.
    pub fn shutting_down(&self) -> CancellationToken {
        self.inner.signal_received.clone()
    }

    /// Fires at `DrainingReadiness`.
    pub fn readiness_drained(&self) -> CancellationToken {
        self.inner.readiness_drained.clone()
    }

    /// Fires at `ShuttingDownServer`: listeners stop accepting and finish in-flight work.
    pub fn stop_accepting(&self) -> CancellationToken {
        self.inner.stop_accepting.clone()
    }

    /// Parent context for in-flight work; cancelled when the hard window opens.
    pub fn server_context(&self) -> CancellationToken {
        self.inner.server_context.clone()
    }

    /// Fires at `Terminated`.
    pub fn terminated(&self) -> CancellationToken {
        self.inner.terminated.clone()
    }

    /// Starts the shutdown sequence programmatically. Idempotent.
    pub fn trigger(&self) {
        self.advance(ShutdownPhase::SignalReceived);
    }

    /// Reports that the server finished its in-flight work.
    pub fn server_stopped(&self) {
        self.inner.server_stopped.cancel();
    }

    /// Spawns the driver, listening for OS signals and [`trigger`](Self::trigger).
    pub fn spawn(&self) -> JoinHandle<()> {
        let host = self.clone();
        tokio::spawn(async move { host.drive(true).await })
    }

    /// Spawns the driver without OS signal handlers; only
    /// [`trigger`](Self::trigger) starts shutdown.
    pub fn spawn_manual(&self) -> JoinHandle<()> {
        let host = self.clone();
        tokio::spawn(async move { host.drive(false).await })
    }

    async fn drive(&self, os_signals: bool) {
        let signal = self.inner.signal_received.clone();
        let os = async {
            if !os_signals {
                return std::future::pending::<()>().await;
            }
            match wait_for_shutdown_signal().await {
                Ok(name) => info!(signal = name, "received shutdown signal"),
                Err(e) => {
                    warn!(error = %e, "failed to install signal handlers; waiting for trigger");
                    std::future::pending::<()>().await
                }
            }
        };
        tokio::select! {
            _ = os => self.trigger(),
            _ = signal.cancelled() => {}
        }

        if let Some(delay) = self.inner.config.drain_delay() {
            info!(delay_ms = delay.as_millis() as u64, "draining readiness");
            tokio::time::sleep(delay).await;
        }
        self.advance(ShutdownPhase::DrainingReadiness);
        self.advance(ShutdownPhase::ShuttingDownServer);

        let stopped = self.inner.server_stopped.clone();
        let period = self.inner.config.shutdown_period;
        if tokio::time::timeout(period, stopped.cancelled()).await.is_ok() {
            info!("server stopped gracefully");
            self.advance(ShutdownPhase::Terminated);
            return;
        }

        warn!(
            period_ms = period.as_millis() as u64,
            "in-flight work did not finish in time; forcing cancellation"
        );
        self.advance(ShutdownPhase::HardShutdownWindow);
        tokio::time::sleep(self.inner.config.shutdown_hard_period).await;
        self.advance(ShutdownPhase::Terminated);
    }

    /// Moves the phase forward to `to` (no-op when already there or beyond).
    fn advance(&self, to: ShutdownPhase) {
        let prev = ShutdownPhase::from_u8(self.inner.phase.fetch_max(to as u8, Ordering::AcqRel));
        if prev >= to {
            return;
        }

        let inner = &self.inner;
        if to >= ShutdownPhase::SignalReceived {
            inner.signal_received.cancel();
        }
        if to >= ShutdownPhase::DrainingReadiness {
            inner.readiness_drained.cancel();
        }
        if to >= ShutdownPhase::ShuttingDownServer {
            inner.stop_accepting.cancel();
        }
        if to >= ShutdownPhase::HardShutdownWindow {
            inner.server_context.cancel();
        }
        if to >= ShutdownPhase::Terminated {
            inner.terminated.cancel();
        }

        inner.tx.send_if_modified(|cur| {
            if to > *cur {
                *cur = to;
                true
            } else {
                false
            }
        });
        inner
            .bus
            .publish(Event::new(EventKind::ShutdownPhaseChanged).with_reason(to.as_label()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn host(drain: u64, period: u64, hard: u64) -> ShutdownHost {
        ShutdownHost::new(
            ShutdownConfig {
                readiness_drain_delay: Duration::from_secs(drain),
                shutdown_period: Duration::from_secs(period),
                shutdown_hard_period: Duration::from_secs(hard),
            },
            Bus::new(64),
        )
    }

    #[test]
    fn phases_are_ordered() {
        assert!(ShutdownPhase::Running < ShutdownPhase::SignalReceived);
        assert!(ShutdownPhase::HardShutdownWindow < ShutdownPhase::Terminated);
        assert_eq!(ShutdownPhase::from_u8(42), ShutdownPhase::Terminated);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let h = host(5, 45, 3);
        h.advance(ShutdownPhase::ShuttingDownServer);
        h.advance(ShutdownPhase::SignalReceived);
        assert_eq!(h.phase(), ShutdownPhase::ShuttingDownServer);
        assert!(h.readiness_drained().is_cancelled());
        assert!(!h.server_context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_sets_shutting_down_immediately() {
        let h = host(5, 45, 3);
        let _driver = h.spawn_manual();
        assert!(!h.is_shutting_down());
        h.trigger();
        assert!(h.is_shutting_down());
        assert!(h.shutting_down().is_cancelled());
        assert!(!h.stop_accepting().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_path_skips_hard_window() {
        let h = host(5, 45, 3);
        let driver = h.spawn_manual();
        h.trigger();

        h.stop_accepting().cancelled().await;
        assert_eq!(h.phase(), ShutdownPhase::ShuttingDownServer);
        h.server_stopped();

        driver.await.unwrap();
        assert_eq!(h.phase(), ShutdownPhase::Terminated);
        assert!(h.terminated().is_cancelled());
        assert!(h.server_context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_server_gets_hard_window() {
        let h = host(0, 10, 3);
        let mut rx = h.subscribe();
        let driver = h.spawn_manual();
        h.trigger();

        let mut seen = vec![*rx.borrow_and_update()];
        while rx.changed().await.is_ok() {
            let p = *rx.borrow_and_update();
            seen.push(p);
            if p == ShutdownPhase::Terminated {
                break;
            }
        }
        driver.await.unwrap();

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "not monotonic: {seen:?}");
        assert!(seen.contains(&ShutdownPhase::HardShutdownWindow));
    }
}
