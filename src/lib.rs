//! GamesmanStatus - endpoint liveness and latency monitoring.
//!
//! Periodically probes a fixed set of HTTP endpoints, stores every
//! observation in SQLite and serves status summaries and latency history.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod directory;
pub mod probe;
pub mod scheduler;
pub mod web;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
