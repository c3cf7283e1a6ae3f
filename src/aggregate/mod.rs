//! Query-time aggregation over raw samples.
//!
//! Nothing here is persisted: summaries and histories are recomputed from
//! the store on every request.

mod summary;
mod timeline;

pub use summary::*;
pub use timeline::*;

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 86_400_000;

/// Nearest-rank percentile of an ascending-sorted slice.
///
/// Selects the element at `max(0, floor(n * q) - 1)`. No interpolation.
pub fn percentile_nearest_rank(sorted: &[u64], q: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() as f64 * q).floor() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[index])
}

/// 95th percentile, nearest rank.
pub fn p95(sorted: &[u64]) -> Option<u64> {
    percentile_nearest_rank(sorted, 0.95)
}
