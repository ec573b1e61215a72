//! # Retry-on-overload policy for the dispatcher.
//!
//! A worker answering `QueueFull` is busy, not broken, so the dispatcher tries
//! again. [`RetryPolicy`] bounds that loop twice: by attempt count and by an
//! overall deadline. Whichever bound trips first ends the loop.

use std::time::Duration;

use super::BackoffPolicy;

/// Bounds for retrying requests rejected with `QueueFull`.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (`0` behaves like `1`).
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub backoff: BackoffPolicy,
    /// Overall deadline across all attempts and sleeps.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    /// `20` attempts, fixed `100ms` interval, `30s` deadline.
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff: BackoffPolicy::fixed(Duration::from_millis(100)),
            deadline: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Attempt count clamped to at least one.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based).
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.next(attempt.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dispatcher_budget() {
        let p = RetryPolicy::default();
        assert_eq!(p.attempts(), 20);
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(19), Duration::from_millis(100));
        assert_eq!(p.deadline, Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(p.attempts(), 1);
    }
}
