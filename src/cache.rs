//! Computed-result cache.
//!
//! A direct-mapped table of `2^bits` entries: a new result simply overwrites
//! whatever hashed to the same index. Unlike a memoization map this loses
//! entries under collision, which is the intended trade: lookup and insert are
//! one index computation each and the memory footprint is fixed.
//!
//! The full key is stored alongside the value so that a lookup can reject
//! collisions exactly and so that [`Cache::retain`] can drop entries whose
//! operands or result died in a garbage collection or moved in a reordering.

use std::cell::Cell;

use crate::utils::MyHash;

struct Entry<K, V> {
    key: K,
    value: V,
}

pub(crate) struct Cache<K, V> {
    data: Vec<Option<Entry<K, V>>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Cache<K, V> {
    /// Create a new table of size `2^bits`.
    pub(crate) fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bits should be in the range 0..=31");

        let size = 1 << bits;
        let bitmask = (size - 1) as u64;

        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Get the number of cache hits.
    pub(crate) fn hits(&self) -> usize {
        self.hits.get()
    }
    /// Get the number of cache misses.
    pub(crate) fn misses(&self) -> usize {
        self.misses.get()
    }

    /// Reset the cache.
    pub(crate) fn clear(&mut self) {
        self.data.fill_with(|| None);
    }

    fn index(&self, key: u64) -> usize {
        (key & self.bitmask) as usize
    }

    /// Get the cached result.
    pub(crate) fn get(&self, key: &K) -> Option<&V>
    where
        K: MyHash + Eq,
    {
        let index = self.index(key.hash());
        match &self.data[index] {
            Some(entry) if entry.key == *key => {
                self.hits.set(self.hits.get() + 1);
                Some(&entry.value)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Insert a result into the cache.
    pub(crate) fn insert(&mut self, key: K, value: V)
    where
        K: MyHash,
    {
        let index = self.index(key.hash());
        self.data[index] = Some(Entry { key, value });
    }

    /// Drop every entry for which `keep` returns false.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        for slot in self.data.iter_mut() {
            if let Some(entry) = slot {
                if !keep(&entry.key, &entry.value) {
                    *slot = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache() {
        let mut cache = Cache::<(u64, u64), i32>::new(3);

        cache.insert((1, 2), 3);
        cache.insert((2, 3), 1);
        cache.insert((1, 3), 2);

        assert_eq!(cache.get(&(1, 2)), Some(&3));
        assert_eq!(cache.get(&(2, 3)), Some(&1));
        assert_eq!(cache.get(&(1, 3)), Some(&2));
        assert_eq!(cache.get(&(2, 1)), None);
        assert_eq!(cache.get(&(3, 2)), None);
        assert_eq!(cache.get(&(1, 1)), None);
    }

    #[test]
    fn test_collision_is_rejected_by_full_key() {
        // One-entry cache: every key collides, but a mismatched key must miss.
        let mut cache = Cache::<(u64, u64), i32>::new(0);
        cache.insert((1, 2), 3);
        assert_eq!(cache.get(&(1, 2)), Some(&3));
        assert_eq!(cache.get(&(9, 9)), None);
        cache.insert((9, 9), 4);
        assert_eq!(cache.get(&(1, 2)), None);
        assert_eq!(cache.get(&(9, 9)), Some(&4));
    }

    #[test]
    fn test_retain() {
        let mut cache = Cache::<(u64, u64), i32>::new(4);
        cache.insert((1, 2), 3);
        cache.insert((2, 3), 1);
        cache.retain(|_, &v| v > 2);
        assert_eq!(cache.get(&(1, 2)), Some(&3));
        assert_eq!(cache.get(&(2, 3)), None);
    }
}
