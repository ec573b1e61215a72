//! # Event subscribers.
//!
//! ## Architecture
//! ```text
//! WorkerPool / ShutdownHost / Dispatcher ── publish(Event) ──► Bus
//!                                                               │
//!                                       spawn_listener(bus, set) ┘
//!                                                               ▼
//!                                                         SubscriberSet::emit
//!                                                    ┌─────────┼─────────┐
//!                                                    ▼         ▼         ▼
//!                                                LogWriter   custom    ...
//! ```
//!
//! ## Contents
//! - [`Subscribe`] extension trait
//! - [`SubscriberSet`] fan-out with per-subscriber bounded queues
//! - [`LogWriter`] tracing-backed subscriber (feature `logging`)
//! - [`spawn_listener`] wires a bus to a set

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::events::Bus;

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
///
/// Lagged receivers skip the lost events and keep going; the task ends when
/// every bus sender is dropped.
pub fn spawn_listener(bus: &Bus, set: Arc<SubscriberSet>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Default subscriber list for the binaries.
pub fn default_subscribers() -> Vec<Arc<dyn Subscribe>> {
    #[allow(unused_mut)]
    let mut subs: Vec<Arc<dyn Subscribe>> = Vec::new();
    #[cfg(feature = "logging")]
    subs.push(Arc::new(LogWriter::new()));
    subs
}
