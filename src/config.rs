//! Shrink policy parameters.

use crate::error::{Result, ShrinkMapError};
use std::time::Duration;

/// Per-instance shrink configuration. Fixed once the map is built.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// How often the background worker evaluates the shrink policy.
    pub shrink_interval: Duration,
    /// Minimum time between two rebuilds.
    pub min_shrink_interval: Duration,
    /// `deleted / inserted` ratio at or above which a rebuild is warranted.
    /// Must lie in `(0, 1)`.
    pub shrink_ratio: f64,
    /// Slack applied to the live size when sizing rebuilt storage. Must be `> 1`.
    pub capacity_growth_factor: f64,
    /// Capacity reserved at construction; also the floor for rebuilt storage.
    pub initial_capacity: usize,
    /// Hard cap on the number of entries. `0` means unlimited.
    pub max_map_size: usize,
    /// Runs the background worker and shrinks after deletions.
    pub auto_shrink_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shrink_interval: Duration::from_secs(5 * 60),
            min_shrink_interval: Duration::from_secs(30),
            shrink_ratio: 0.25,
            capacity_growth_factor: 1.2,
            initial_capacity: 16,
            max_map_size: 1_000_000,
            auto_shrink_enabled: true,
        }
    }
}

impl Config {
    pub fn with_shrink_interval(mut self, interval: Duration) -> Self {
        self.shrink_interval = interval;
        self
    }

    pub fn with_min_shrink_interval(mut self, interval: Duration) -> Self {
        self.min_shrink_interval = interval;
        self
    }

    pub fn with_shrink_ratio(mut self, ratio: f64) -> Self {
        self.shrink_ratio = ratio;
        self
    }

    pub fn with_capacity_growth_factor(mut self, factor: f64) -> Self {
        self.capacity_growth_factor = factor;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_max_map_size(mut self, size: usize) -> Self {
        self.max_map_size = size;
        self
    }

    pub fn with_auto_shrink_enabled(mut self, enabled: bool) -> Self {
        self.auto_shrink_enabled = enabled;
        self
    }

    /// Checks every field against its documented range and reports the
    /// first one that is out of range.
    ///
    /// `initial_capacity` and `max_map_size` are unsigned, so every value
    /// is valid for them.
    pub fn validate(&self) -> Result<()> {
        if self.shrink_interval.is_zero() {
            return Err(ShrinkMapError::invalid_config(
                "shrink_interval",
                "must be positive",
            ));
        }
        if !(self.shrink_ratio > 0.0 && self.shrink_ratio < 1.0) {
            return Err(ShrinkMapError::invalid_config(
                "shrink_ratio",
                format!("must be between 0 and 1 (exclusive), got {}", self.shrink_ratio),
            ));
        }
        if self.min_shrink_interval.is_zero() {
            return Err(ShrinkMapError::invalid_config(
                "min_shrink_interval",
                "must be positive",
            ));
        }
        if !(self.capacity_growth_factor.is_finite() && self.capacity_growth_factor > 1.0) {
            return Err(ShrinkMapError::invalid_config(
                "capacity_growth_factor",
                format!(
                    "must be a finite value greater than 1, got {}",
                    self.capacity_growth_factor
                ),
            ));
        }
        Ok(())
    }
}
