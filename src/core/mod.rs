//! Process lifecycle core.
//!
//! - [`host`]: the staged [`ShutdownHost`] state machine;
//! - [`config`]: its timing windows ([`ShutdownConfig`]);
//! - [`shutdown`]: cross-platform OS signal handling.

mod config;
mod host;
mod shutdown;

pub use config::ShutdownConfig;
pub use host::{ShutdownHost, ShutdownPhase};
pub use shutdown::wait_for_shutdown_signal;
