//! # Browser child process.
//!
//! [`BrowserProcess`] owns one headless browser started with
//! [`launch_args`](super::args::launch_args). The child is spawned with
//! `kill_on_drop`, so a dropped handle never leaves a process behind.
//!
//! ## Rules
//! - `close()` kills, reaps within [`REAP_TIMEOUT`], then removes the profile directory.
//! - `close()` is idempotent and never blocks indefinitely.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::pool::WARMUP_SLOT;

use super::args::{data_dir, debug_port, launch_args};
use super::BrowserConfig;

/// Upper bound on waiting for a killed browser to exit.
pub const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running browser process bound to one slot.
#[derive(Debug)]
pub struct BrowserProcess {
    id: i32,
    child: Option<Child>,
    port: u16,
    data_dir: PathBuf,
}

impl BrowserProcess {
    /// Launches the browser for slot `id`.
    pub fn start(config: &BrowserConfig, id: i32) -> std::io::Result<Self> {
        let args = launch_args(config, id);
        if id == WARMUP_SLOT {
            let mut sorted = args.clone();
            sorted.sort();
            info!(
                executable = %config.executable.display(),
                args = ?sorted,
                "browser launch arguments"
            );
        }

        let child = Command::new(&config.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        debug!(slot = id, pid = ?child.id(), "browser process started");
        Ok(Self {
            id,
            child: Some(child),
            port: debug_port(config.base_port, id),
            data_dir: data_dir(&config.data_dir, id),
        })
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Base URL of the devtools HTTP endpoint.
    pub fn debug_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// True once [`close`](Self::close) ran.
    pub fn is_closed(&self) -> bool {
        self.child.is_none()
    }

    /// Kills the process, reaps it with a bounded wait and removes its profile directory.
    pub async fn close(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.start_kill() {
            debug!(slot = self.id, error = %e, "browser already exited");
        }
        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!(slot = self.id, %status, "browser process reaped"),
            Ok(Err(e)) => warn!(slot = self.id, error = %e, "failed to reap browser process"),
            Err(_) => warn!(
                slot = self.id,
                timeout_ms = REAP_TIMEOUT.as_millis() as u64,
                "browser process did not exit in time; it may be lingering"
            ),
        }

        match tokio::fs::remove_dir_all(&self.data_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                slot = self.id,
                dir = %self.data_dir.display(),
                error = %e,
                "failed to remove browser profile"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BrowserConfig {
            executable: dir.path().join("no-such-browser"),
            data_dir: dir.path().to_path_buf(),
            ..BrowserConfig::default()
        };
        assert!(BrowserProcess::start(&cfg, 0).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_is_idempotent_and_removes_profile() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BrowserConfig {
            executable: PathBuf::from("sleep"),
            data_dir: dir.path().to_path_buf(),
            ..BrowserConfig::default()
        };
        // `sleep` rejects the browser flags and exits; close must still succeed.
        let mut proc = BrowserProcess::start(&cfg, 3).unwrap();
        std::fs::create_dir_all(dir.path().join("browser-3")).unwrap();

        proc.close().await;
        assert!(proc.is_closed());
        assert!(!dir.path().join("browser-3").exists());
        proc.close().await;
    }
}
