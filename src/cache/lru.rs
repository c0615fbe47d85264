//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Every touch stamps the key with a fresh sequence number. `order` maps
/// sequence numbers to keys, so its first element is always the least
/// recently used key and its last element the most recently used one.
#[derive(Debug)]
pub struct LruTracker<K> {
    /// Sequence number -> key, ascending = oldest first
    order: BTreeMap<u64, K>,
    /// Key -> its current sequence number
    stamps: HashMap<K, u64>,
    /// Next sequence number to hand out
    next_seq: u64,
}

impl<K> Default for LruTracker<K> {
    fn default() -> Self {
        Self {
            order: BTreeMap::new(),
            stamps: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Hash + Eq + Clone> LruTracker<K> {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if it is new.
    pub fn touch(&mut self, key: &K) {
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(previous) = self.stamps.insert(key.clone(), seq) {
            self.order.remove(&previous);
        }
        self.order.insert(seq, key.clone());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &K) {
        if let Some(seq) = self.stamps.remove(key) {
            self.order.remove(&seq);
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.stamps.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    #[cfg(test)]
    pub fn peek_oldest(&self) -> Option<&K> {
        self.order.values().next()
    }

    /// Iterates keys from least to most recently used.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.stamps.contains_key(key)
    }
}
