//! Retry, restart and fault policies.
//!
//! This module groups the knobs that decide **whether** a browser is replaced
//! and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`BackoffPolicy`] how restart delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization so slots do not restart in lockstep
//! - [`RetryPolicy`]   dispatcher retry-on-overload bounds (attempts + deadline)
//! - [`FaultPolicy`]   restart or keep a browser after a failed render
//!
//! ## Quick wiring
//! ```text
//! Dispatcher ── RetryPolicy { max_attempts, backoff: fixed(100ms), deadline }
//! WorkerPool ── FaultPolicy::requires_restart(..) ─► restart slot
//!                                                     └─► BackoffPolicy.next(attempt) between failed starts
//! ```

mod backoff;
mod fault;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use fault::FaultPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
