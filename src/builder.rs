//! Fluent construction of a `ShrinkMap`.

use crate::config::Config;
use crate::error::Result;
use crate::map::ShrinkMap;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use std::collections::hash_map::RandomState;
use std::time::Duration;

/// Starts from [`Config::default`]; each setter overrides one field.
///
/// ```
/// use shrink_map::ShrinkMapBuilder;
///
/// let map = ShrinkMapBuilder::<String, u64>::new()
///     .shrink_ratio(0.5)
///     .initial_capacity(128)
///     .auto_shrink(false)
///     .try_build()
///     .expect("valid config");
/// map.set("k".to_string(), 1).unwrap();
/// map.stop();
/// ```
#[derive(Clone, Debug)]
pub struct ShrinkMapBuilder<K, V, S = RandomState> {
    config: Config,
    hasher: S,
    _pd: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ShrinkMapBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            hasher: RandomState::new(),
            _pd: PhantomData,
        }
    }
}

impl<K, V> Default for ShrinkMapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ShrinkMapBuilder<K, V, S> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn shrink_interval(mut self, interval: Duration) -> Self {
        self.config.shrink_interval = interval;
        self
    }

    pub fn min_shrink_interval(mut self, interval: Duration) -> Self {
        self.config.min_shrink_interval = interval;
        self
    }

    pub fn shrink_ratio(mut self, ratio: f64) -> Self {
        self.config.shrink_ratio = ratio;
        self
    }

    pub fn capacity_growth_factor(mut self, factor: f64) -> Self {
        self.config.capacity_growth_factor = factor;
        self
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// `0` means unlimited.
    pub fn max_map_size(mut self, size: usize) -> Self {
        self.config.max_map_size = size;
        self
    }

    pub fn auto_shrink(mut self, enabled: bool) -> Self {
        self.config.auto_shrink_enabled = enabled;
        self
    }

    pub fn hasher<S2>(self, hasher: S2) -> ShrinkMapBuilder<K, V, S2> {
        ShrinkMapBuilder {
            config: self.config,
            hasher,
            _pd: PhantomData,
        }
    }

    pub fn current_config(&self) -> &Config {
        &self.config
    }
}

impl<K, V, S> ShrinkMapBuilder<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Builds without validating the configuration.
    pub fn build(self) -> ShrinkMap<K, V, S> {
        ShrinkMap::with_config_and_hasher(self.config, self.hasher)
    }

    /// Builds after [`Config::validate`] accepts the configuration.
    pub fn try_build(self) -> Result<ShrinkMap<K, V, S>> {
        ShrinkMap::try_with_config_and_hasher(self.config, self.hasher)
    }
}

impl<K, V> ShrinkMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn builder() -> ShrinkMapBuilder<K, V> {
        ShrinkMapBuilder::new()
    }
}
