//! Snapshot iteration.

use crate::map::ShrinkMap;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;

/// Owning iterator over a point-in-time copy of a map's entries.
///
/// The copy is taken when the iterator is created; later mutations of the
/// map are not observed.
#[derive(Debug)]
pub struct SnapshotIter<K, V> {
    inner: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for SnapshotIter<K, V> {
    type Item = (K, V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for SnapshotIter<K, V> {}
impl<K, V> FusedIterator for SnapshotIter<K, V> {}

impl<K, V, S> ShrinkMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub fn iter(&self) -> SnapshotIter<K, V> {
        SnapshotIter {
            inner: self.snapshot().into_iter(),
        }
    }
}

impl<K, V, S> IntoIterator for &ShrinkMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    type Item = (K, V);
    type IntoIter = SnapshotIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
