//! # Headless browser slots.
//!
//! Production implementation of the pool's [`Renderer`](crate::pool::Renderer)
//! seam on top of a Chromium-family browser driven over the devtools protocol.
//!
//! - [`args`]: deterministic launch arguments, ports and profile directories
//! - [`process`]: the child process ([`BrowserProcess`])
//! - [`devtools`]: the WebSocket protocol client ([`CdpConnection`])
//! - [`pdf`]: `Page.printToPDF` parameters
//! - [`wait`]: element wait expressions
//! - [`renderer`]: [`ChromeRenderer`] and [`ChromeFactory`]

use std::path::PathBuf;
use std::time::Duration;

pub mod args;
pub mod devtools;
pub mod pdf;
pub mod process;
pub mod renderer;
pub mod wait;

pub use devtools::{CdpConnection, DevtoolsError};
pub use process::BrowserProcess;
pub use renderer::{ChromeFactory, ChromeRenderer};

/// Where and how browsers are launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Browser executable.
    pub executable: PathBuf,
    /// Root for per-slot profile directories.
    pub data_dir: PathBuf,
    /// Debug port of slot 0; slot `n` uses `base_port + n`.
    pub base_port: u16,
    /// How long to wait for the devtools endpoint after launch.
    pub startup_timeout: Duration,
    /// Upper bound for a single devtools command.
    pub command_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("/headless-shell/headless-shell"),
            data_dir: PathBuf::from("/tmp"),
            base_port: 5050,
            startup_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}
