//! # Shutdown timing configuration.
//!
//! [`ShutdownConfig`] holds the three windows that drive the
//! [`ShutdownHost`](super::ShutdownHost):
//!
//! ```text
//! signal ──(readiness_drain_delay)──► stop accepting ──(shutdown_period)──► hard window ──(shutdown_hard_period)──► exit
//! ```
//!
//! ## Sentinel values
//! - `readiness_drain_delay = 0s` → skip the drain (local iteration)
//! - `shutdown_period = 0s` → go straight to the hard window
//! - `shutdown_hard_period = 0s` → terminate as soon as the hard window opens

use std::time::Duration;

/// Timing of the staged shutdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Time between the signal and stopping listeners, so routers notice
    /// the failing readiness probe and stop sending traffic.
    pub readiness_drain_delay: Duration,

    /// How long listeners may take to finish in-flight requests.
    pub shutdown_period: Duration,

    /// Time granted to force-cancelled work before the process exits.
    pub shutdown_hard_period: Duration,
}

impl ShutdownConfig {
    /// Local iteration preset: no readiness drain, same periods otherwise.
    pub fn local() -> Self {
        Self {
            readiness_drain_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Returns the drain delay, or `None` when draining is disabled.
    #[inline]
    pub fn drain_delay(&self) -> Option<Duration> {
        if self.readiness_drain_delay.is_zero() {
            None
        } else {
            Some(self.readiness_drain_delay)
        }
    }

    /// Total worst-case time from signal to exit.
    #[inline]
    pub fn total(&self) -> Duration {
        self.readiness_drain_delay + self.shutdown_period + self.shutdown_hard_period
    }
}

impl Default for ShutdownConfig {
    /// Production defaults: `5s` drain, `45s` shutdown, `3s` hard window.
    fn default() -> Self {
        Self {
            readiness_drain_delay: Duration::from_secs(5),
            shutdown_period: Duration::from_secs(45),
            shutdown_hard_period: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_preset_skips_drain() {
        let cfg = ShutdownConfig::local();
        assert_eq!(cfg.drain_delay(), None);
        assert_eq!(cfg.shutdown_period, Duration::from_secs(45));
    }

    #[test]
    fn production_total_is_bounded() {
        assert_eq!(ShutdownConfig::default().total(), Duration::from_secs(53));
    }
}
