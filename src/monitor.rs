//! # Connectivity to the worker.
//!
//! [`ConnectivityMonitor`] probes the worker's readiness endpoint in a loop and
//! keeps the result in one atomic cell, so request handlers read it without
//! locking.
//!
//! ```text
//!            ok (sleep 10s)                     fail (sleep 5s)
//! Unknown ─────────────────► Healthy ◄──────────────────────► Broken
//!    └───────────────────── fail (sleep 5s) ─────────────────────┘
//! ```
//!
//! ## Rules
//! - Single writer (the probe loop), many readers.
//! - Every probe is bounded by `probe_timeout`.
//! - Transitions are logged and published as `ConnectivityChanged`.
//! - The loop ends when its cancellation token fires.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::{Bus, Event, EventKind};
use crate::rpc::WorkerClient;

/// Last observed reachability of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectivityState {
    Unknown = 0,
    Healthy = 1,
    Broken = 2,
}

impl ConnectivityState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectivityState::Healthy,
            2 => ConnectivityState::Broken,
            _ => ConnectivityState::Unknown,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Healthy => "healthy",
            ConnectivityState::Broken => "broken",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Probe timing.
#[derive(Clone, Copy, Debug)]
pub struct MonitorConfig {
    /// Upper bound on one health call.
    pub probe_timeout: Duration,
    /// Sleep after a successful probe.
    pub healthy_interval: Duration,
    /// Sleep after a failed probe.
    pub broken_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            healthy_interval: Duration::from_secs(10),
            broken_interval: Duration::from_secs(5),
        }
    }
}

/// Background worker reachability probe.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    client: Arc<dyn WorkerClient>,
    config: MonitorConfig,
    state: Arc<AtomicU8>,
    bus: Bus,
}

impl ConnectivityMonitor {
    pub fn new(client: Arc<dyn WorkerClient>, config: MonitorConfig, bus: Bus) -> Self {
        Self {
            client,
            config,
            state: Arc::new(AtomicU8::new(ConnectivityState::Unknown as u8)),
            bus,
        }
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_healthy(&self) -> bool {
        self.state() == ConnectivityState::Healthy
    }

    /// Runs one probe, records the new state and returns it.
    pub async fn probe_once(&self) -> ConnectivityState {
        let timeout = self.config.probe_timeout;
        let result = match tokio::time::timeout(timeout, self.client.health(timeout)).await {
            Ok(res) => res.map_err(|e| e.to_string()),
            Err(_) => Err(format!("health check timed out after {timeout:?}")),
        };

        let next = if result.is_ok() {
            ConnectivityState::Healthy
        } else {
            ConnectivityState::Broken
        };
        let prev = ConnectivityState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));

        match (prev, &result) {
            (ConnectivityState::Unknown, Ok(())) => info!("initialized connectivity to worker"),
            (ConnectivityState::Broken, Ok(())) => info!("regained connectivity to worker"),
            (ConnectivityState::Healthy, Ok(())) => {}
            (ConnectivityState::Unknown, Err(err)) => {
                warn!(error = %err, "could not initialize connectivity to worker")
            }
            (ConnectivityState::Healthy, Err(err)) => {
                warn!(error = %err, "lost connectivity to worker")
            }
            (ConnectivityState::Broken, Err(err)) => {
                warn!(error = %err, "still no connectivity to worker")
            }
        }
        if prev != next {
            self.bus
                .publish(Event::new(EventKind::ConnectivityChanged).with_reason(next.as_label()));
        }
        next
    }

    /// Spawns the probe loop; it stops when `token` is cancelled.
    pub fn spawn(&self, token: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                let state = tokio::select! {
                    s = monitor.probe_once() => s,
                    _ = token.cancelled() => break,
                };
                let sleep = match state {
                    ConnectivityState::Healthy => monitor.config.healthy_interval,
                    _ => monitor.config.broken_interval,
                };
                tokio::select! {
                    _ = tokio::time::sleep(sleep) => {}
                    _ = token.cancelled() => break,
                }
            }
        })
    }
}
