//! Telemetry events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to telemetry emitted by the worker pool, render sessions,
//! the shutdown host, the connectivity monitor and the dispatcher.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `WorkerPool`, render sessions, `ShutdownHost`,
//!   `ConnectivityMonitor`, `Dispatcher`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `subscribers::spawn_listener` (fans out to a `SubscriberSet`)
//!   and tests observing the bus directly.

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_BUS_CAPACITY};
pub use event::{Event, EventKind};
