//! Configuration module for the status service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file in the working directory is read first; variables already
//! set in the process environment take precedence over it.
//! The result is validated once at startup and never mutated afterwards.

use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0)
    pub host: IpAddr,
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file
    pub db_path: String,
    /// Path to the JSON probe directory
    pub probes_path: String,
    /// Base delay between ticks in milliseconds (default: 5 minutes)
    pub probe_interval_ms: u64,
    /// Symmetric jitter applied to every tick delay, in seconds
    pub probe_jitter_secs: u64,
    /// Per-probe request timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            http_port: 8080,
            db_path: "./data/gamesmanstatus.sqlite".to_string(),
            probes_path: "./config/probes.json".to_string(),
            probe_interval_ms: 300_000,
            probe_jitter_secs: 20,
            probe_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUS_HOST`: bind address (default: 0.0.0.0)
    /// - `STATUS_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STATUS_DB_PATH`: database file path (default: "./data/gamesmanstatus.sqlite")
    /// - `STATUS_PROBES_PATH`: probe directory file (default: "./config/probes.json")
    /// - `STATUS_PROBE_INTERVAL_MS`: tick interval (default: 300000)
    /// - `STATUS_PROBE_JITTER_SECS`: tick jitter (default: 20)
    /// - `STATUS_PROBE_TIMEOUT_MS`: per-probe timeout (default: 5000)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env_file(".env")
    }

    /// Merge `path` into the process environment, then load from it.
    ///
    /// A missing env file is not an error.
    pub fn load_with_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if let Err(e) = dotenv_flow::from_path(path.as_ref()) {
            tracing::debug!("No env file loaded from {}: {}", path.as_ref().display(), e);
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("STATUS_HOST") {
            cfg.host = parse_var("STATUS_HOST", &v)?;
        }
        if let Some(v) = lookup("STATUS_HTTP_PORT") {
            cfg.http_port = parse_var("STATUS_HTTP_PORT", &v)?;
        }
        if let Some(v) = lookup("STATUS_DB_PATH") {
            cfg.db_path = non_empty("STATUS_DB_PATH", v)?;
        }
        if let Some(v) = lookup("STATUS_PROBES_PATH") {
            cfg.probes_path = non_empty("STATUS_PROBES_PATH", v)?;
        }
        if let Some(v) = lookup("STATUS_PROBE_INTERVAL_MS") {
            cfg.probe_interval_ms = positive("STATUS_PROBE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("STATUS_PROBE_JITTER_SECS") {
            cfg.probe_jitter_secs = parse_var("STATUS_PROBE_JITTER_SECS", &v)?;
        }
        if let Some(v) = lookup("STATUS_PROBE_TIMEOUT_MS") {
            cfg.probe_timeout_ms = positive("STATUS_PROBE_TIMEOUT_MS", &v)?;
        }

        Ok(cfg)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_jitter(&self) -> Duration {
        Duration::from_secs(self.probe_jitter_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let n: u64 = parse_var(var, value)?;
    if n == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(n)
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            var,
            value,
            reason: "must not be empty".to_string(),
        });
    }
    Ok(value)
}
