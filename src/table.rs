//! Table: the backing storage that the shrink engine rebuilds.
//!
//! Entries live in a `SlotMap`; a `HashTable` indexes them by their stored
//! hash. Neither structure hands memory back after removals, so capacity
//! only drops when the whole table is rebuilt via [`Table::compact`].

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
}

pub struct Table<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, Default::default())
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, Default::default())
    }
}

impl<K, V> Default for Table<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over entries in a `Table`.
pub struct Iter<'a, K, V> {
    it: slotmap::basic::Iter<'a, DefaultKey, Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, e)| (&e.key, &e.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V, S> Table<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            hasher,
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    fn find_slot<Q>(&self, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.borrow() == q)
                    .unwrap_or(false)
            })
            .copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of entries the slot store can hold without reallocating.
    /// Never decreases on removal.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.find_slot(q)?;
        self.slots.get(k).map(|e| &e.value)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.find_slot(q)?;
        self.slots.get_mut(k).map(|e| &mut e.value)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_slot(q).is_some()
    }

    /// Inserts or overwrites. Returns the previous value when the key was
    /// already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.make_hash(&key);
        match self.index.entry(
            hash,
            |&kk| self.slots.get(kk).map(|e| e.key == key).unwrap_or(false),
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => {
                let k = *o.get();
                self.slots
                    .get_mut(k)
                    .map(|e| core::mem::replace(&mut e.value, value))
            }
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(Entry { key, value, hash });
                let _ = v.insert(k);
                None
            }
        }
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let slots = &self.slots;
        let (k, _) = self
            .index
            .find_entry(hash, |&kk| {
                slots.get(kk).map(|e| e.key.borrow() == q).unwrap_or(false)
            })
            .ok()?
            .remove();
        let entry = self.slots.remove(k)?;
        Some((entry.key, entry.value))
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots.iter(),
        }
    }

    /// Moves every entry into fresh storage sized for `capacity` and drops
    /// the old allocations. Stored hashes are reused, so `K: Hash` and
    /// `K: Eq` are never invoked here.
    pub fn compact(&mut self, capacity: usize) {
        let capacity = capacity.max(self.slots.len());
        let mut fresh = Self::with_capacity_and_hasher(capacity, self.hasher.clone());
        let old = core::mem::replace(&mut self.slots, SlotMap::with_key());
        self.index = HashTable::new();
        for (_, entry) in old {
            let hash = entry.hash;
            let k = fresh.slots.insert(entry);
            let slots = &fresh.slots;
            let _ = fresh.index.insert_unique(hash, k, |&kk| {
                slots.get(kk).map(|e| e.hash).unwrap_or(0)
            });
        }
        *self = fresh;
    }
}
