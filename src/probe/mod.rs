//! Probe module for endpoint monitoring.
//!
//! A probe run never fails from the caller's point of view: every transport
//! problem is folded into the returned [`ProbeOutcome`].

mod http;

pub use http::*;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("timeout")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The classified result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub http_code: Option<u16>,
    /// True only for an exact 200
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Outcome for a request that produced a status line.
    pub fn from_status(http_code: u16, latency: Duration) -> Self {
        Self {
            http_code: Some(http_code),
            ok: http_code == 200,
            latency_ms: duration_ms(latency),
            error: None,
        }
    }

    /// Outcome for a request that never produced a status line.
    pub fn failed(err: &ProbeError, latency: Duration) -> Self {
        Self {
            http_code: None,
            ok: false,
            latency_ms: duration_ms(latency),
            error: Some(err.to_string()),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Something that can check a URL within a bounded time.
pub trait Prober: Send + Sync + 'static {
    fn run(&self, url: &str, timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send;
}
