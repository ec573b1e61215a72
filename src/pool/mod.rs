//! Browser slots, admission and render sessions.
//!
//! ## Contents
//! - [`WorkerPool`] admission queue, slot ownership, restart and recycling
//! - [`PoolConfig`] sizing and time bounds
//! - [`Renderer`], [`RendererFactory`] the seam to a concrete browser
//! - [`Session`], [`RenderContext`] per-render bookkeeping handed to renderers
//!
//! ## Quick wiring
//! ```text
//! WorkerPool::new(factory, config, bus, host)
//!     .start()                       warm-up -1, then slots 0..N
//!     .submit(request, cancel)       ──► RenderResult | RenderError
//!     .shutdown(grace)               ──► Ok | GraceExceeded
//! ```

mod config;
mod core;
mod queue;
mod renderer;
mod session;
mod slot;

pub use self::config::PoolConfig;
pub use self::core::{PoolStats, WorkerPool};
pub use self::renderer::{RenderContext, Renderer, RendererFactory};
pub use self::session::{CleanupOutcome, Session};
pub use self::slot::{SlotStatus, WARMUP_SLOT};
