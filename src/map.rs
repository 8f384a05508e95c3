//! ShrinkMap: concurrent map that rebuilds its storage to reclaim memory
//! left behind by deletions.

use crate::config::Config;
use crate::error::{Result, ShrinkMapError};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::policy;
use crate::scheduler::{self, Scheduler, SchedulerState};
use crate::single_flight::SingleFlight;
use crate::table::Table;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::RandomState;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct Inner<K, V, S> {
    pub(crate) table: RwLock<Table<K, V, S>>,
    // Keys inserted since the last rebuild.
    pub(crate) item_count: AtomicI64,
    // Successful deletions since the last rebuild.
    pub(crate) deleted_count: AtomicI64,
    epoch: Instant,
    // Nanoseconds after `epoch` at which the last rebuild finished.
    last_shrink_nanos: AtomicU64,
    pub(crate) config: Config,
    pub(crate) metrics: Metrics,
    flight: SingleFlight,
    stopped: AtomicBool,
    scheduler: Mutex<Option<Scheduler>>,
}

/// A concurrent hash map that shrinks its backing storage after deletions.
///
/// `ShrinkMap` is a handle: clones share the same table. When
/// `auto_shrink_enabled` is set, construction starts a background worker
/// that holds its own reference to the map. That worker runs until
/// [`ShrinkMap::stop`] is called; dropping every handle without calling
/// `stop` leaves the worker thread and the table alive.
pub struct ShrinkMap<K, V, S = RandomState> {
    pub(crate) inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for ShrinkMap<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ShrinkMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds a map without validating `config`.
    pub fn new(config: Config) -> Self {
        Self::with_config_and_hasher(config, RandomState::new())
    }

    /// Builds a map after checking `config` with [`Config::validate`].
    pub fn try_new(config: Config) -> Result<Self> {
        Self::try_with_config_and_hasher(config, RandomState::new())
    }
}

impl<K, V> Default for ShrinkMap<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<K, V, S> ShrinkMap<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub fn with_config_and_hasher(config: Config, hasher: S) -> Self {
        let epoch = Instant::now();
        let inner = Arc::new(Inner {
            table: RwLock::new(Table::with_capacity_and_hasher(
                config.initial_capacity,
                hasher,
            )),
            item_count: AtomicI64::new(0),
            deleted_count: AtomicI64::new(0),
            epoch,
            last_shrink_nanos: AtomicU64::new(0),
            config,
            metrics: Metrics::new(),
            flight: SingleFlight::new(),
            stopped: AtomicBool::new(false),
            scheduler: Mutex::new(None),
        });
        if inner.config.auto_shrink_enabled {
            Inner::start_worker(&inner);
        }
        Self { inner }
    }

    pub fn try_with_config_and_hasher(config: Config, hasher: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config_and_hasher(config, hasher))
    }

    /// Inserts or overwrites `key`.
    ///
    /// A new key is rejected with [`ShrinkMapError::CapacityExceeded`] when
    /// the map already holds `max_map_size` entries. Reaching the cap starts
    /// a shrink attempt without waiting for it: on the background worker if
    /// there is one, otherwise on a detached thread.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.inner.ensure_running()?;
        let at_cap = {
            let mut table = self.inner.table.write();
            if let Some(slot) = table.get_mut(&key) {
                *slot = value;
                return Ok(());
            }
            self.inner.check_capacity(table.len(), 1)?;
            table.insert(key, value);
            self.inner.record_new_keys(1, table.len());
            self.inner.at_capacity(table.len())
        };
        if at_cap {
            Inner::shrink_in_background(&self.inner);
        }
        Ok(())
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.inner.table.read().get(key).cloned()
    }

    /// Runs `f` on the value under the shared lock, without cloning it.
    pub fn get_with<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.inner.table.read().get(key).map(f)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.inner.table.read().contains_key(key)
    }

    /// Removes `key`, returning whether it was present. With auto-shrink
    /// enabled, a successful delete runs a shrink attempt before returning.
    ///
    /// Permitted after [`ShrinkMap::stop`].
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = {
            let mut table = self.inner.table.write();
            let removed = table.remove(key);
            if removed.is_some() {
                self.inner.deleted_count.fetch_add(1, Ordering::SeqCst);
            }
            removed
        };
        let Some(entry) = removed else {
            return false;
        };
        drop(entry);
        if self.inner.config.auto_shrink_enabled {
            self.inner.try_shrink();
        }
        true
    }

    /// Inserted minus deleted keys. Read from two atomics without the table
    /// lock, so a concurrent rebuild may be observed mid-update.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries the backing storage can hold without growing.
    pub fn capacity(&self) -> usize {
        self.inner.table.read().capacity()
    }

    /// Stores `value` only if `predicate` accepts the current value
    /// (`None` when absent). The predicate runs under the exclusive lock and
    /// must not call back into this map. Returns whether the value was stored.
    pub fn conditional_set<F>(&self, key: K, value: V, predicate: F) -> Result<bool>
    where
        F: FnOnce(Option<&V>) -> bool,
    {
        self.inner.ensure_running()?;
        let mut table = self.inner.table.write();
        let existing = table.get(&key);
        let exists = existing.is_some();
        if !predicate(existing) {
            return Ok(false);
        }
        if exists {
            table.insert(key, value);
            return Ok(true);
        }
        self.inner.check_capacity(table.len(), 1)?;
        table.insert(key, value);
        self.inner.record_new_keys(1, table.len());
        Ok(true)
    }

    /// Stores `value` only when `key` is absent.
    pub fn set_if_absent(&self, key: K, value: V) -> Result<bool> {
        self.conditional_set(key, value, |existing| existing.is_none())
    }

    /// Returns the existing value and `true`, or inserts `value` and returns
    /// it with `false`.
    pub fn get_or_set(&self, key: K, value: V) -> Result<(V, bool)>
    where
        V: Clone,
    {
        self.inner.ensure_running()?;
        let mut table = self.inner.table.write();
        if let Some(existing) = table.get(&key) {
            return Ok((existing.clone(), true));
        }
        self.inner.check_capacity(table.len(), 1)?;
        table.insert(key, value.clone());
        self.inner.record_new_keys(1, table.len());
        Ok((value, false))
    }

    /// Copies every entry out under the shared lock. O(len).
    pub fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let table = self.inner.table.read();
        table
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Rebuilds storage if the shrink policy allows it. Returns whether a
    /// rebuild happened.
    pub fn try_shrink(&self) -> bool {
        self.inner.try_shrink()
    }

    /// Rebuilds storage regardless of policy. Still a no-op for an empty map
    /// or while another rebuild is running.
    pub fn force_shrink(&self) -> bool {
        self.inner.rebuild()
    }

    /// Stops the background worker and rejects further inserts. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// State of the background worker, `None` if none was started.
    pub fn worker_state(&self) -> Option<SchedulerState> {
        self.inner.scheduler.lock().as_ref().map(Scheduler::state)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }
}

impl<K, V, S> Inner<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn start_worker(this: &Arc<Self>) {
        let worker = Arc::clone(this);
        let faults = Arc::clone(this);
        let spawned = Scheduler::spawn(
            this.config.shrink_interval,
            move || {
                worker.try_shrink();
            },
            move |fault| faults.metrics.record_panic(fault.message, fault.backtrace),
        );
        match spawned {
            Ok(scheduler) => *this.scheduler.lock() = Some(scheduler),
            Err(err) => {
                tracing::error!(error = %err, "failed to start shrink worker");
                this.metrics
                    .record_error(format!("failed to start shrink worker: {err}"), "");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        let inserted = self.item_count.load(Ordering::SeqCst);
        let deleted = self.deleted_count.load(Ordering::SeqCst);
        (inserted - deleted).max(0) as usize
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ShrinkMapError::MapStopped);
        }
        Ok(())
    }

    /// Rejects growth by `adding` keys past `max_map_size`. Callers hold the
    /// exclusive lock so `current` is exact.
    pub(crate) fn check_capacity(&self, current: usize, adding: usize) -> Result<()> {
        let max = self.config.max_map_size;
        if max > 0 && current.saturating_add(adding) > max {
            tracing::warn!(current, adding, max, "insert rejected: capacity exceeded");
            return Err(ShrinkMapError::CapacityExceeded { current, max });
        }
        Ok(())
    }

    pub(crate) fn at_capacity(&self, size: usize) -> bool {
        self.config.max_map_size > 0 && size >= self.config.max_map_size
    }

    /// Counts keys that were absent before insertion. Call under the
    /// exclusive lock with the resulting table size.
    pub(crate) fn record_new_keys(&self, added: u64, size: usize) {
        self.item_count.fetch_add(added as i64, Ordering::SeqCst);
        self.metrics.record_inserts(added, size);
    }

    /// Returns whether a running worker accepted the request.
    pub(crate) fn nudge_worker(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(Scheduler::nudge)
    }

    /// Runs `try_shrink` off the caller's thread. Without a worker a
    /// one-shot thread is spawned; single-flight keeps overlapping attempts
    /// from rebuilding twice.
    pub(crate) fn shrink_in_background(this: &Arc<Self>) {
        if this.nudge_worker() {
            return;
        }
        let task = Arc::clone(this);
        let faults = Arc::clone(this);
        let spawned = scheduler::run_detached(
            move || {
                task.try_shrink();
            },
            move |fault| faults.metrics.record_panic(fault.message, fault.backtrace),
        );
        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to start shrink thread");
            this.metrics
                .record_error(format!("failed to start shrink thread: {err}"), "");
        }
    }

    fn last_shrink(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_shrink_nanos.load(Ordering::SeqCst))
    }

    fn mark_shrunk(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.epoch).as_nanos();
        self.last_shrink_nanos
            .store(u64::try_from(nanos).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Evaluates the policy and rebuilds if it allows. The counters are read
    /// inside the flight, so a caller racing a finished rebuild sees the reset
    /// counters and backs off.
    pub(crate) fn try_shrink(&self) -> bool {
        let Some(_flight) = self.flight.try_enter() else {
            tracing::trace!("rebuild already in flight");
            return false;
        };
        let inserted = self.item_count.load(Ordering::SeqCst);
        let deleted = self.deleted_count.load(Ordering::SeqCst);
        if !policy::should_shrink(
            inserted,
            deleted,
            self.last_shrink(),
            Instant::now(),
            &self.config,
        ) {
            tracing::trace!(inserted, deleted, "shrink not warranted");
            return false;
        }
        self.rebuild_in_flight()
    }

    /// Rebuilds regardless of policy. At most one rebuild runs at a time;
    /// others return `false` immediately.
    pub(crate) fn rebuild(&self) -> bool {
        let Some(_flight) = self.flight.try_enter() else {
            tracing::trace!("rebuild already in flight");
            return false;
        };
        self.rebuild_in_flight()
    }

    /// Moves live entries into storage sized by the policy and resets the
    /// waste counters. Caller holds the flight guard.
    fn rebuild_in_flight(&self) -> bool {
        let started = Instant::now();
        let live = self.len();
        if live == 0 {
            return false;
        }
        let capacity = policy::rebuild_capacity(live, &self.config);

        let (old_capacity, new_capacity, size) = {
            let mut table = self.table.write();
            let old_capacity = table.capacity();
            table.compact(capacity);
            let size = table.len();
            self.deleted_count.store(0, Ordering::SeqCst);
            self.item_count.store(size as i64, Ordering::SeqCst);
            (old_capacity, table.capacity(), size)
        };

        let elapsed = started.elapsed();
        self.metrics.record_shrink(elapsed);
        self.mark_shrunk(Instant::now());
        tracing::debug!(
            size,
            old_capacity,
            new_capacity,
            elapsed_us = elapsed.as_micros() as u64,
            "storage rebuilt"
        );
        true
    }

    fn stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if let Some(scheduler) = self.scheduler.lock().as_mut() {
            scheduler.stop();
        }
    }
}

impl<K, V, S> fmt::Debug for ShrinkMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inserted = self.inner.item_count.load(Ordering::SeqCst);
        let deleted = self.inner.deleted_count.load(Ordering::SeqCst);
        f.debug_struct("ShrinkMap")
            .field("len", &(inserted - deleted).max(0))
            .field("deleted_since_rebuild", &deleted)
            .field("rebuilding", &self.inner.flight.is_in_flight())
            .field("stopped", &self.inner.stopped.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    fn manual() -> Config {
        Config::default()
            .with_auto_shrink_enabled(false)
            .with_min_shrink_interval(Duration::ZERO)
            .with_shrink_ratio(0.5)
            .with_capacity_growth_factor(1.5)
            .with_initial_capacity(4)
            .with_max_map_size(0)
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn counters_track_inserts_and_deletes() {
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(manual());
        for i in 0..10 {
            m.set(i, i).unwrap();
        }
        m.set(3, 33).unwrap();
        assert!(m.delete(&1));
        assert!(!m.delete(&1));
        assert_eq!(m.inner.item_count.load(Ordering::SeqCst), 10);
        assert_eq!(m.inner.deleted_count.load(Ordering::SeqCst), 1);
        assert_eq!(m.len(), 9);
    }

    #[test]
    fn rebuild_resets_counters_and_keeps_len() {
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(manual());
        for i in 0..100 {
            m.set(i, i).unwrap();
        }
        for i in 0..60 {
            m.delete(&i);
        }
        assert!(m.force_shrink());
        assert_eq!(m.inner.deleted_count.load(Ordering::SeqCst), 0);
        assert_eq!(m.inner.item_count.load(Ordering::SeqCst), 40);
        assert_eq!(m.len(), 40);
        assert!(m.inner.last_shrink() > m.inner.epoch);
    }

    #[test]
    fn rebuild_refused_while_in_flight() {
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(manual());
        m.set(1, 1).unwrap();
        let _held = m.inner.flight.try_enter().unwrap();
        assert!(!m.force_shrink());
        assert_eq!(m.metrics().total_shrinks(), 0);
    }

    #[test]
    fn worker_keeps_map_alive_until_stopped() {
        let cfg = manual()
            .with_auto_shrink_enabled(true)
            .with_shrink_interval(Duration::from_secs(3600));
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(cfg);
        m.set(1, 1).unwrap();
        let weak: Weak<Inner<u32, u32, RandomState>> = Arc::downgrade(&m.inner);
        drop(m);

        // The worker still owns a reference.
        let inner = weak.upgrade().expect("worker keeps the map alive");
        assert_eq!(inner.table.read().len(), 1);
        inner.stop();
        drop(inner);
        assert!(wait_until(Duration::from_secs(5), || weak.upgrade().is_none()));
    }

    #[test]
    fn map_without_worker_is_freed_on_drop() {
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(manual());
        let weak = Arc::downgrade(&m.inner);
        assert!(m.worker_state().is_none());
        drop(m);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn debug_output_reports_len() {
        let m: ShrinkMap<u32, u32> = ShrinkMap::new(manual());
        m.set(1, 1).unwrap();
        let s = format!("{:?}", m);
        assert!(s.contains("len: 1"), "{s}");
    }
}
