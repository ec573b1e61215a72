//! # Slot state.
//!
//! A slot is one browser process identified by a small integer. The id is
//! stable across restarts: a replacement process takes over the same id,
//! debug port and data directory.
//!
//! ```text
//!        ┌──────────── release ◄────────────┐
//!        ▼                                  │
//!     Idle ──admit──► Generating ──► CleaningUp
//!        ▲                                  │ fault / dirty / aged
//!        └──────── started ◄── Restarting ◄─┘
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::renderer::Renderer;

/// Slot id of the short-lived browser used to read the engine version.
pub const WARMUP_SLOT: i32 = -1;

/// Observable lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// Free and waiting for a request.
    Idle,
    /// Owned by a render session.
    Generating,
    /// Post-render cleanup in progress.
    CleaningUp,
    /// Browser process is being replaced.
    Restarting,
}

impl SlotStatus {
    pub fn as_label(&self) -> &'static str {
        match self {
            SlotStatus::Idle => "idle",
            SlotStatus::Generating => "generating",
            SlotStatus::CleaningUp => "cleaning_up",
            SlotStatus::Restarting => "restarting",
        }
    }
}

/// A running browser and the moment it was started.
pub(crate) struct Slot {
    pub(crate) id: i32,
    pub(crate) renderer: Box<dyn Renderer>,
    started_at: Instant,
}

impl Slot {
    pub(crate) fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            id: renderer.id(),
            renderer,
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the process outlived `limit`.
    #[inline]
    pub(crate) fn is_due(&self, limit: Option<Duration>) -> bool {
        limit.is_some_and(|limit| self.age() >= limit)
    }
}
