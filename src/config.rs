//! # Process configuration.
//!
//! [`WorkerConfig`] and [`ProxyConfig`] gather every knob of the two binaries.
//! Both load from environment variables (after a `.env` file, if present) and
//! fall back to production defaults for unset keys. A set but unparsable value
//! is an error, never silently replaced.
//!
//! ```text
//! PDFVISOR_ENV                              production | local
//! PDFVISOR_LISTEN_ADDR                      proxy 0.0.0.0:5030, worker 0.0.0.0:5031
//! PDFVISOR_WORKER_ID                        worker id header (default $HOSTNAME)
//! PDFVISOR_POOL_SIZE                        2
//! PDFVISOR_QUEUE_CAPACITY                   4
//! PDFVISOR_BROWSER_RESTART_INTERVAL_SECS    1800 (0 = never, local default)
//! PDFVISOR_READINESS_DRAIN_DELAY_SECS       5    (local default 0)
//! PDFVISOR_SHUTDOWN_PERIOD_SECS             45
//! PDFVISOR_SHUTDOWN_HARD_PERIOD_SECS        3
//! PDFVISOR_BROWSER_PATH                     /headless-shell/headless-shell
//! PDFVISOR_BROWSER_DATA_DIR                 /tmp
//! PDFVISOR_BROWSER_BASE_PORT                5050
//! WORKER_HTTP_ADDR                          http://localhost:5031
//! ```
//!
//! # Example
//! ```
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use pdfvisor::config::WorkerConfig;
//!
//! let env = HashMap::from([
//!     ("PDFVISOR_ENV", "local"),
//!     ("PDFVISOR_POOL_SIZE", "4"),
//! ]);
//! let cfg = WorkerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
//!
//! assert_eq!(cfg.pool.pool_size, 4);
//! assert_eq!(cfg.pool.browser_restart_interval, Duration::ZERO);
//! assert_eq!(cfg.shutdown.readiness_drain_delay, Duration::ZERO);
//! ```

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::browser::BrowserConfig;
use crate::core::ShutdownConfig;
use crate::events::DEFAULT_BUS_CAPACITY;
use crate::monitor::MonitorConfig;
use crate::policies::RetryPolicy;
use crate::pool::PoolConfig;

/// Invalid configuration value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Production,
    /// Developer machine: no readiness drain, no browser recycling.
    Local,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "local" | "development" | "dev" => Ok(Environment::Local),
            other => Err(format!("unknown environment {other:?}")),
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match (self.lookup)(key) {
            None => Ok(default),
            Some(raw) if raw.trim().is_empty() => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        }
    }

    fn secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }

    fn string(&self, key: &'static str, default: &str) -> String {
        (self.lookup)(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn environment(&self) -> Result<Environment, ConfigError> {
        self.parse("PDFVISOR_ENV", Environment::default())
    }

    fn shutdown(&self, env: Environment) -> Result<ShutdownConfig, ConfigError> {
        let base = match env {
            Environment::Production => ShutdownConfig::default(),
            Environment::Local => ShutdownConfig::local(),
        };
        Ok(ShutdownConfig {
            readiness_drain_delay: self
                .secs("PDFVISOR_READINESS_DRAIN_DELAY_SECS", base.readiness_drain_delay)?,
            shutdown_period: self.secs("PDFVISOR_SHUTDOWN_PERIOD_SECS", base.shutdown_period)?,
            shutdown_hard_period: self
                .secs("PDFVISOR_SHUTDOWN_HARD_PERIOD_SECS", base.shutdown_hard_period)?,
        })
    }
}

fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

/// Worker process configuration.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub environment: Environment,
    pub listen_addr: SocketAddr,
    /// Sent back in the `X-Worker-Id` header.
    pub worker_id: String,
    pub pool: PoolConfig,
    pub browser: BrowserConfig,
    pub shutdown: ShutdownConfig,
    pub bus_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5031)),
            worker_id: "worker".to_string(),
            pool: PoolConfig::default(),
            browser: BrowserConfig::default(),
            shutdown: ShutdownConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// Loads `.env`, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let d = Self::default();
        let environment = env.environment()?;

        let restart_default = match environment {
            Environment::Production => d.pool.browser_restart_interval,
            Environment::Local => Duration::ZERO,
        };
        let pool = PoolConfig {
            pool_size: env.parse("PDFVISOR_POOL_SIZE", d.pool.pool_size)?,
            queue_capacity: env.parse("PDFVISOR_QUEUE_CAPACITY", d.pool.queue_capacity)?,
            browser_restart_interval: env
                .secs("PDFVISOR_BROWSER_RESTART_INTERVAL_SECS", restart_default)?,
            ..d.pool
        };
        let browser = BrowserConfig {
            executable: PathBuf::from(env.string(
                "PDFVISOR_BROWSER_PATH",
                &d.browser.executable.to_string_lossy(),
            )),
            data_dir: PathBuf::from(env.string(
                "PDFVISOR_BROWSER_DATA_DIR",
                &d.browser.data_dir.to_string_lossy(),
            )),
            base_port: env.parse("PDFVISOR_BROWSER_BASE_PORT", d.browser.base_port)?,
            ..d.browser
        };
        let worker_id = env.string("PDFVISOR_WORKER_ID", &env.string("HOSTNAME", &d.worker_id));

        Ok(Self {
            environment,
            listen_addr: env.parse("PDFVISOR_LISTEN_ADDR", d.listen_addr)?,
            worker_id,
            pool,
            browser,
            shutdown: env.shutdown(environment)?,
            bus_capacity: d.bus_capacity,
        })
    }
}

/// Proxy process configuration.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub environment: Environment,
    pub listen_addr: SocketAddr,
    /// Base URL of the worker.
    pub worker_addr: String,
    /// Per-call bound on `/generate`, slightly above the worker's render timeout.
    pub worker_request_timeout: Duration,
    pub retry: RetryPolicy,
    pub monitor: MonitorConfig,
    pub shutdown: ShutdownConfig,
    pub bus_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5030)),
            worker_addr: "http://localhost:5031".to_string(),
            worker_request_timeout: Duration::from_secs(35),
            retry: RetryPolicy::default(),
            monitor: MonitorConfig::default(),
            shutdown: ShutdownConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl ProxyConfig {
    /// Loads `.env`, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let d = Self::default();
        let environment = env.environment()?;
        Ok(Self {
            environment,
            listen_addr: env.parse("PDFVISOR_LISTEN_ADDR", d.listen_addr)?,
            worker_addr: env.string("WORKER_HTTP_ADDR", &d.worker_addr),
            shutdown: env.shutdown(environment)?,
            ..d
        })
    }
}
