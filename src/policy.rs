//! Shrink policy: when to rebuild and how large the rebuilt storage is.
//!
//! Both functions are pure; callers pass the counters and the clock reading.

use crate::config::Config;
use std::time::{Duration, Instant};

/// Decides whether a rebuild is warranted.
///
/// Two gates must both open: the waste ratio `deleted / inserted` has reached
/// `shrink_ratio`, and at least `min_shrink_interval` has elapsed since the
/// last rebuild. With nothing inserted there is nothing to reclaim.
pub fn should_shrink(
    inserted: i64,
    deleted: i64,
    last_shrink: Instant,
    now: Instant,
    config: &Config,
) -> bool {
    if inserted <= 0 {
        return false;
    }
    let waste_ratio = deleted as f64 / inserted as f64;
    if waste_ratio < config.shrink_ratio {
        return false;
    }
    let since: Duration = now.saturating_duration_since(last_shrink);
    since >= config.min_shrink_interval
}

/// Capacity for rebuilt storage: `ceil(live * growth)`, floored at the
/// configured initial capacity.
pub fn rebuild_capacity(live: usize, config: &Config) -> usize {
    let grown = (live as f64 * config.capacity_growth_factor).ceil();
    // Non-finite or out-of-range growth factors fall back to the live size.
    let grown = if grown.is_finite() && grown >= live as f64 {
        grown as usize
    } else {
        live
    };
    grown.max(config.initial_capacity)
}
