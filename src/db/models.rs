//! Database model types.

use serde::Serialize;

/// Probe id recorded when a probe task fails before producing an outcome.
pub const UNKNOWN_PROBE_ID: &str = "unknown";

/// A single raw probe observation.
///
/// Rows are append-only: once written they are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSample {
    /// Write time in epoch milliseconds
    pub ts: i64,
    pub probe_id: String,
    /// Status code, absent on transport failure or timeout
    pub http_code: Option<u16>,
    /// True only when the request succeeded with exactly 200
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl RawSample {
    /// Sample standing in for a probe whose task died without an outcome.
    pub fn placeholder(ts: i64, error: impl Into<String>) -> Self {
        Self {
            ts,
            probe_id: UNKNOWN_PROBE_ID.to_string(),
            http_code: None,
            ok: false,
            latency_ms: 0,
            error: Some(error.into()),
        }
    }
}
