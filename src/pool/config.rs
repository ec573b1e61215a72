//! # Worker pool configuration.
//!
//! [`PoolConfig`] sizes the pool and bounds every long-running step of a slot's
//! life: rendering, cleanup, periodic recycling and restart backoff.
//!
//! ## Sentinel values
//! - `browser_restart_interval = 0` disables age-based recycling
//! - `pool_size = 0` is treated as one slot
//! - `cleanup_attempts = 0` is treated as one attempt

use std::time::Duration;

use crate::policies::{BackoffPolicy, FaultPolicy};

/// Worker pool configuration.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of browser slots.
    pub pool_size: usize,
    /// Maximum number of requests waiting for a slot.
    pub queue_capacity: usize,
    /// Maximum age of a browser process before it is replaced (`0` = never).
    pub browser_restart_interval: Duration,
    /// How often idle slots are checked against `browser_restart_interval`.
    pub recycle_check_interval: Duration,
    /// Upper bound on one render.
    pub render_timeout: Duration,
    /// Cleanup attempts before a slot is declared dirty.
    pub cleanup_attempts: u32,
    /// Restart decision after a failed render.
    pub fault_policy: FaultPolicy,
    /// Delay between failed attempts to start a replacement browser.
    pub restart_backoff: BackoffPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 2,
            queue_capacity: 4,
            browser_restart_interval: Duration::from_secs(30 * 60),
            recycle_check_interval: Duration::from_secs(30),
            render_timeout: Duration::from_secs(30),
            cleanup_attempts: 3,
            fault_policy: FaultPolicy::default(),
            restart_backoff: BackoffPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Number of slots to start.
    #[inline]
    pub fn slots(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Age limit for browser processes, `None` when recycling is disabled.
    #[inline]
    pub fn restart_interval(&self) -> Option<Duration> {
        if self.browser_restart_interval.is_zero() {
            None
        } else {
            Some(self.browser_restart_interval)
        }
    }

    #[inline]
    pub fn cleanup_attempts(&self) -> u32 {
        self.cleanup_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_disables_recycling() {
        let cfg = PoolConfig {
            browser_restart_interval: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.restart_interval(), None);
        assert_eq!(
            PoolConfig::default().restart_interval(),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn zero_sizes_fall_back_to_one() {
        let cfg = PoolConfig {
            pool_size: 0,
            cleanup_attempts: 0,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.slots(), 1);
        assert_eq!(cfg.cleanup_attempts(), 1);
    }
}
