//! Multi-key updates applied under a single exclusive lock.

use crate::error::Result;
use crate::map::ShrinkMap;
use crate::table::Table;
use core::hash::{BuildHasher, Hash};
use std::sync::atomic::Ordering;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp<K, V> {
    Set(K, V),
    Delete(K),
}

impl<K, V> BatchOp<K, V> {
    pub fn key(&self) -> &K {
        match self {
            BatchOp::Set(k, _) | BatchOp::Delete(k) => k,
        }
    }
}

/// An ordered list of operations for [`ShrinkMap::apply_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch<K, V> {
    ops: Vec<BatchOp<K, V>>,
}

impl<K, V> Default for Batch<K, V> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<K, V> Batch<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn set(mut self, key: K, value: V) -> Self {
        self.ops.push(BatchOp::Set(key, value));
        self
    }

    pub fn delete(mut self, key: K) -> Self {
        self.ops.push(BatchOp::Delete(key));
        self
    }

    pub fn push(&mut self, op: BatchOp<K, V>) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp<K, V>] {
        &self.ops
    }
}

impl<K, V> From<Vec<BatchOp<K, V>>> for Batch<K, V> {
    fn from(ops: Vec<BatchOp<K, V>>) -> Self {
        Self { ops }
    }
}

impl<K, V> FromIterator<BatchOp<K, V>> for Batch<K, V> {
    fn from_iter<I: IntoIterator<Item = BatchOp<K, V>>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl<K, V> Extend<BatchOp<K, V>> for Batch<K, V> {
    fn extend<I: IntoIterator<Item = BatchOp<K, V>>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

/// Net change in table size if `ops` were applied in order.
fn net_new_keys<K, V, S>(table: &Table<K, V, S>, ops: &[BatchOp<K, V>]) -> isize
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    // Presence of each touched key after the ops seen so far.
    let mut present: hashbrown::HashMap<&K, bool> = hashbrown::HashMap::new();
    let mut net = 0isize;
    for op in ops {
        let key = op.key();
        let was = match present.get(key) {
            Some(&p) => p,
            None => table.contains_key(key),
        };
        let now = matches!(op, BatchOp::Set(..));
        match (was, now) {
            (false, true) => net += 1,
            (true, false) => net -= 1,
            _ => {}
        }
        present.insert(key, now);
    }
    net
}

impl<K, V, S> ShrinkMap<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Applies `batch` in order under one exclusive lock.
    ///
    /// The capacity cap is checked once, up front, against the size the
    /// table would have after the whole batch: either every operation is
    /// applied or none is. An empty batch succeeds without effect.
    pub fn apply_batch(&self, batch: Batch<K, V>) -> Result<()> {
        self.inner.ensure_running()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut removed = Vec::new();
        {
            let mut table = self.inner.table.write();
            if self.inner.config.max_map_size > 0 {
                let net = net_new_keys(&*table, &batch.ops);
                if net > 0 {
                    self.inner.check_capacity(table.len(), net.unsigned_abs())?;
                }
            }

            let mut inserted = 0u64;
            let mut deleted = 0i64;
            for op in batch.ops {
                match op {
                    BatchOp::Set(key, value) => {
                        if table.insert(key, value).is_none() {
                            inserted += 1;
                        }
                    }
                    BatchOp::Delete(key) => {
                        if let Some(entry) = table.remove(&key) {
                            deleted += 1;
                            removed.push(entry);
                        }
                    }
                }
            }
            if inserted > 0 {
                self.inner.record_new_keys(inserted, table.len());
            }
            if deleted > 0 {
                self.inner.deleted_count.fetch_add(deleted, Ordering::SeqCst);
            }
        }
        drop(removed);

        if self.inner.config.auto_shrink_enabled {
            self.inner.nudge_worker();
        }
        Ok(())
    }
}
