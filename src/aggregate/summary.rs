//! Current status of every probe ever observed.

use serde::Serialize;

use super::{p95, DAY_MS};
use crate::db::{DbError, RawSample, Store};

/// Status derived from a probe's latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// Latest sample was an exact 200
    Ok,
    /// Got a status code, but not 200
    Down,
    /// No status code at all: transport failure or timeout
    Error,
}

impl ProbeStatus {
    pub fn of(sample: &RawSample) -> Self {
        if sample.ok {
            Self::Ok
        } else if sample.http_code.is_some() {
            Self::Down
        } else {
            Self::Error
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub id: String,
    pub current_status: ProbeStatus,
    pub http_code: Option<u16>,
    /// Trailing 24 hour p95
    pub p95_latency_ms: Option<u64>,
    pub last_ts: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub overall_status: OverallStatus,
    pub generated_at_ms: i64,
    pub probes: Vec<ProbeSummary>,
}

/// Build the status summary as of `now_ms`.
///
/// Probes that have never produced a sample are not listed. The overall
/// status is `ok` only if every listed probe is `ok`.
pub fn summarize(store: &Store, now_ms: i64) -> Result<Summary, DbError> {
    let since = now_ms - DAY_MS;

    let probes = store
        .latest_per_probe()?
        .into_iter()
        .map(|latest| -> Result<ProbeSummary, DbError> {
            let latencies = store.latencies_in_range(&latest.probe_id, since)?;
            Ok(ProbeSummary {
                current_status: ProbeStatus::of(&latest),
                p95_latency_ms: p95(&latencies),
                id: latest.probe_id,
                http_code: latest.http_code,
                last_ts: latest.ts,
                error: latest.error,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let overall_status = if probes.iter().all(|p| p.current_status == ProbeStatus::Ok) {
        OverallStatus::Ok
    } else {
        OverallStatus::Degraded
    };

    Ok(Summary {
        overall_status,
        generated_at_ms: now_ms,
        probes,
    })
}
