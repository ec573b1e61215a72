//! # pdfvisor
//!
//! **pdfvisor** renders web pages to PDF for many concurrent callers using a
//! small, fixed number of headless browser processes.
//!
//! The crate is built around admission control and lifecycle-safe shutdown:
//! a bounded FIFO queue in front of the browser slots, fast `QueueFull`
//! rejection with a bounded retry loop at the edge, and a staged shutdown
//! state machine shared by both processes.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  client ──HTTP──► pdfvisor-proxy                              pdfvisor-worker
//!                  ┌──────────────────────────┐  POST /generate ┌──────────────────────────────┐
//!                  │ dispatcher::router        │ ──────────────► │ rpc::router                  │
//!                  │  └─ Dispatcher            │ ◄────────────── │  └─ WorkerPool               │
//!                  │      validate, retry 429  │   pdf | status  │      AdmissionQueue (FIFO)   │
//!                  │ ConnectivityMonitor ──────┼─ /health/ready ─►│      slots 0..N (browser)    │
//!                  │ ShutdownHost              │                 │ ShutdownHost                 │
//!                  └──────────────────────────┘                  └──────────────────────────────┘
//!                               │                                              │
//!                               ▼                                              ▼
//!                      ┌──────────────────────── Bus (broadcast) ─────────────────────────┐
//!                      └──► subscribers::spawn_listener ──► SubscriberSet ──► LogWriter ...
//! ```
//!
//! ### Render session
//! ```text
//! submit(request, cancel)
//!   ├─► admit: free slot | enqueue | QueueFull
//!   ├─► publish SessionStarted{ slot, session, queue_depth }
//!   ├─► generate (cookies ─► navigate ─► wait ─► print)      bounded by render_timeout
//!   ├─► publish SessionCompleted | SessionFailed
//!   ├─► respond to caller
//!   ├─► cleanup (up to 3 attempts, skipped if the browser was never touched)
//!   └─► FaultPolicy / age ─► restart slot (backoff) | release to oldest waiter
//! ```
//!
//! ### Shutdown
//! ```text
//! Running ─signal─► SignalReceived ─drain─► DrainingReadiness ─► ShuttingDownServer
//!                                                                    │ server stopped in time
//!                                                                    ├──────────────► Terminated
//!                                                                    └─► HardShutdownWindow ─► Terminated
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                       |
//! |-------------------|----------------------------------------------------------|------------------------------------------|
//! | **Pool**          | Slots, admission queue, cleanup, restart and recycling.  | [`WorkerPool`], [`Renderer`]             |
//! | **Dispatch**      | Validation, retry-on-overload, problem translation.      | [`Dispatcher`], [`ProblemDetails`]       |
//! | **Shutdown**      | Staged shutdown with awaitable phase tokens.             | [`ShutdownHost`], [`ShutdownPhase`]      |
//! | **Connectivity**  | Worker reachability probe.                               | [`ConnectivityMonitor`]                  |
//! | **Subscriber API**| Hook into pool, shutdown and dispatch events.            | [`Subscribe`], [`SubscriberSet`]         |
//! | **Policies**      | Restart backoff, dispatcher retries, fault handling.     | [`BackoffPolicy`], [`RetryPolicy`], [`FaultPolicy`] |
//! | **Errors**        | Classified render failures and runtime errors.           | [`RenderError`], [`ErrorKind`], [`RuntimeError`] |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdfvisor::browser::{BrowserConfig, ChromeFactory};
//! use pdfvisor::pool::{PoolConfig, WorkerPool};
//! use pdfvisor::types::RenderRequest;
//! use pdfvisor::Bus;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = Arc::new(ChromeFactory::new(BrowserConfig::default()));
//!     let pool = WorkerPool::new(factory, PoolConfig::default(), Bus::default(), None);
//!     pool.start().await?;
//!
//!     let request = Arc::new(RenderRequest::new("https://example.com"));
//!     let pdf = pool.submit(request, CancellationToken::new()).await?;
//!     println!("{} bytes from {}", pdf.data.len(), pdf.browser.summary());
//!
//!     pool.shutdown(std::time::Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod config;
mod core;
pub mod dispatcher;
mod error;
mod events;
pub mod logging;
pub mod monitor;
mod policies;
pub mod pool;
pub mod rpc;
mod subscribers;
pub mod types;

// ---- Public re-exports ----

pub use crate::core::{wait_for_shutdown_signal, ShutdownConfig, ShutdownHost, ShutdownPhase};
pub use dispatcher::{Dispatcher, ProblemDetails};
pub use error::{BoxError, ErrorKind, RenderError, RuntimeError};
pub use events::{Bus, Event, EventKind, DEFAULT_BUS_CAPACITY};
pub use monitor::{ConnectivityMonitor, ConnectivityState};
pub use policies::{BackoffPolicy, FaultPolicy, JitterPolicy, RetryPolicy};
pub use pool::{Renderer, RendererFactory, WorkerPool};
pub use subscribers::{default_subscribers, spawn_listener, Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
