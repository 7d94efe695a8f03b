//! Bounded result cache with least-recently-used eviction.
//!
//! Entries live in a slab (`Vec`) threaded by an index-based doubly-linked
//! list, most-recently-used at the head. A `HashMap` maps keys to slab
//! slots, so `get` and `put` are O(1) amortized. Slots are reused in place on
//! eviction and only released wholesale by [`ResultCache::clear`].
//!
//! The cache has no synchronization of its own; the [`Pool`](crate::Pool)
//! keeps it behind its coordinator lock.

use std::collections::HashMap;
use std::hash::Hash;

/// Default number of entries kept by a pool's result cache.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU map from keys to values with a fixed entry capacity.
///
/// # Example
///
/// ```
/// use memopool::cache::ResultCache;
///
/// let mut cache = ResultCache::new(2);
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a"); // "a" is now most recently used
/// cache.put("c", 3); // evicts "b"
///
/// assert!(cache.contains(&"a"));
/// assert!(!cache.contains(&"b"));
/// ```
#[derive(Debug)]
pub struct ResultCache<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    /// Most recently used slot.
    head: Option<usize>,
    /// Least recently used slot.
    tail: Option<usize>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> ResultCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            capacity,
        }
    }

    /// Looks up `key` and marks the entry most recently used on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.touch(slot);
        Some(&self.nodes[slot].value)
    }

    /// Looks up `key` without affecting recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&slot| &self.nodes[slot].value)
    }

    /// Inserts or updates `key`, marking it most recently used.
    ///
    /// Inserting a new key into a full cache evicts the least recently used
    /// entry first; the evicted pair is returned.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.touch(slot);
            return None;
        }

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };

        if self.index.len() >= self.capacity {
            if let Some(lru) = self.tail {
                self.unlink(lru);
                let evicted = std::mem::replace(&mut self.nodes[lru], node);
                self.index.remove(&evicted.key);
                self.index.insert(key, lru);
                self.push_front(lru);
                return Some((evicted.key, evicted.value));
            }
        }

        self.nodes.push(node);
        let slot = self.nodes.len() - 1;
        self.index.insert(key, slot);
        self.push_front(slot);
        None
    }

    /// Returns whether `key` is cached, without affecting recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates keys from least to most recently used.
    pub fn keys_lru(&self) -> impl Iterator<Item = &K> + '_ {
        std::iter::successors(self.tail, move |&slot| self.nodes[slot].prev)
            .map(move |slot| &self.nodes[slot].key)
    }

    fn touch(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;

        match self.head {
            Some(h) => self.nodes[h].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn keys<K: Eq + Hash + Clone + Copy, V>(cache: &ResultCache<K, V>) -> Vec<K> {
        cache.keys_lru().copied().collect()
    }

    #[test]
    fn test_get_miss_on_empty() {
        let mut cache: ResultCache<u32, u32> = ResultCache::new(4);
        assert!(cache.get(&1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let mut cache = ResultCache::new(4);
        assert!(cache.put(1, "one").is_none());
        assert_eq!(cache.get(&1), Some(&"one"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let mut cache = ResultCache::new(3);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);

        let evicted = cache.put(4, 40);
        assert_eq!(evicted, Some((1, 10)));
        assert_eq!(keys(&cache), vec![2, 3, 4]);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = ResultCache::new(3);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);
        cache.get(&1);

        let evicted = cache.put(4, 40);
        assert_eq!(evicted, Some((2, 20)));
        assert_eq!(keys(&cache), vec![3, 1, 4]);
    }

    #[test]
    fn test_update_existing_key_refreshes_recency() {
        let mut cache = ResultCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        assert!(cache.put(1, 11).is_none());

        cache.put(3, 30);
        assert_eq!(cache.peek(&1), Some(&11));
        assert!(!cache.contains(&2));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let mut cache = ResultCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        assert_eq!(cache.peek(&1), Some(&10));

        cache.put(3, 30);
        assert!(!cache.contains(&1));
    }

    #[test]
    fn test_capacity_one() {
        let mut cache = ResultCache::new(1);
        cache.put("a", 1);
        assert_eq!(cache.put("b", 2), Some(("a", 1)));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache: ResultCache<u8, u8> = ResultCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = ResultCache::new(2);
        cache.put(1, 1);
        cache.put(2, 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(keys(&cache), Vec::<i32>::new());

        cache.put(3, 3);
        assert_eq!(keys(&cache), vec![3]);
    }

    #[test]
    fn test_slot_reuse_after_many_evictions() {
        let mut cache = ResultCache::new(3);
        for i in 0..100 {
            cache.put(i, i * 2);
        }
        assert_eq!(keys(&cache), vec![97, 98, 99]);
        assert_eq!(cache.get(&98), Some(&196));
        assert_eq!(keys(&cache), vec![97, 99, 98]);
    }
}
