//! Liveness bookkeeping for the tick loop.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::now_ms;

/// Process start time plus the start time of the most recent tick.
///
/// Only used for liveness reporting; nothing reads it for correctness.
#[derive(Debug)]
pub struct Heartbeat {
    started_at_ms: i64,
    last_tick_ms: AtomicI64,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::starting_at(now_ms())
    }

    pub fn starting_at(started_at_ms: i64) -> Self {
        Self {
            started_at_ms,
            last_tick_ms: AtomicI64::new(started_at_ms),
        }
    }

    /// Record the start of a tick and return its timestamp.
    pub fn beat(&self) -> i64 {
        let now = now_ms();
        self.last_tick_ms.store(now, Ordering::Relaxed);
        now
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn last_tick_ms(&self) -> i64 {
        self.last_tick_ms.load(Ordering::Relaxed)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
