//! Time-bucketed latency and availability history for one probe.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{p95, DAY_MS, HOUR_MS};
use crate::db::{DbError, RawSample, Store};

pub const MIN_HISTORY_DAYS: u32 = 1;
pub const MAX_HISTORY_DAYS: u32 = 60;
/// Longest range still served with hourly buckets.
pub const MAX_HOURLY_DAYS: u32 = 7;

/// Clamp a requested history length to `[1, 60]` days.
pub fn clamp_days(days: i64) -> u32 {
    days.clamp(MIN_HISTORY_DAYS as i64, MAX_HISTORY_DAYS as i64) as u32
}

/// Bucket width, chosen from the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketWidth {
    Hour,
    Day,
}

impl BucketWidth {
    pub fn for_days(days: u32) -> Self {
        if days <= MAX_HOURLY_DAYS {
            Self::Hour
        } else {
            Self::Day
        }
    }

    pub fn as_ms(self) -> i64 {
        match self {
            Self::Hour => HOUR_MS,
            Self::Day => DAY_MS,
        }
    }
}

/// Aggregate of all samples falling in one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub window_start: i64,
    #[serde(rename = "ok")]
    pub ok_count: u64,
    #[serde(rename = "down")]
    pub down_count: u64,
    pub p95_latency_ms: Option<u64>,
    pub sample_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    pub probe_id: String,
    pub days: u32,
    pub from_ms: i64,
    pub to_ms: i64,
    pub width: BucketWidth,
    pub buckets: Vec<Bucket>,
}

#[derive(Default)]
struct Accumulator {
    ok: u64,
    down: u64,
    latencies: Vec<u64>,
}

/// Start of the window of `width_ms` containing `ts`.
pub fn window_start(ts: i64, width_ms: i64) -> i64 {
    ts.div_euclid(width_ms) * width_ms
}

/// Group samples into fixed-width windows.
///
/// Only non-empty windows are returned, ascending by start.
pub fn bucketize(samples: &[RawSample], width_ms: i64) -> Vec<Bucket> {
    let mut windows: BTreeMap<i64, Accumulator> = BTreeMap::new();

    for s in samples {
        let acc = windows.entry(window_start(s.ts, width_ms)).or_default();
        if s.ok {
            acc.ok += 1;
        } else {
            acc.down += 1;
        }
        acc.latencies.push(s.latency_ms);
    }

    windows
        .into_iter()
        .map(|(start, mut acc)| {
            acc.latencies.sort_unstable();
            Bucket {
                window_start: start,
                ok_count: acc.ok,
                down_count: acc.down,
                p95_latency_ms: p95(&acc.latencies),
                sample_count: acc.latencies.len() as u64,
            }
        })
        .collect()
}

/// History of `probe_id` over the trailing `days` (clamped) ending at `now_ms`.
pub fn history(store: &Store, probe_id: &str, days: i64, now_ms: i64) -> Result<History, DbError> {
    let days = clamp_days(days);
    let width = BucketWidth::for_days(days);
    let from_ms = now_ms - days as i64 * DAY_MS;

    let samples = store.samples_in_range(probe_id, from_ms)?;

    Ok(History {
        probe_id: probe_id.to_string(),
        days,
        from_ms,
        to_ms: now_ms,
        width,
        buckets: bucketize(&samples, width.as_ms()),
    })
}
