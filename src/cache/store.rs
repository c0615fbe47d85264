//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration and an optional memory ceiling.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::stats::CacheCounters;
use crate::cache::{estimate_size, CacheEntry, CacheMetrics, LruTracker};
use crate::config::CacheConfig;

// == LRU Cache ==
/// Bounded key/value cache with LRU eviction and TTL support.
///
/// The cache is not internally synchronized; callers share it behind a lock
/// (see [`SharedCache`](crate::client::SharedCache)).
#[derive(Debug)]
pub struct LruCache<K, V> {
    /// Key-value storage
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<K>,
    /// Hit/miss/eviction counters
    counters: CacheCounters,
    /// Sum of `size_bytes` over all live entries
    memory_usage: usize,
    /// Set while usage sits above the warning threshold
    memory_warning_active: bool,
    /// Number of memory warnings emitted so far
    memory_warnings: u64,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Lifetime of every inserted entry
    ttl: Duration,
    /// Optional ceiling on `memory_usage`
    max_memory_bytes: Option<usize>,
    /// Fraction of `max_memory_bytes` at which a warning is emitted
    memory_warning_threshold: f64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone + Serialize,
{
    // == Constructor ==
    /// Creates a cache holding at most `max_size` entries, each living for `ttl`.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            counters: CacheCounters::default(),
            memory_usage: 0,
            memory_warning_active: false,
            memory_warnings: 0,
            max_size: max_size.max(1),
            ttl,
            max_memory_bytes: None,
            memory_warning_threshold: 0.9,
        }
    }

    /// Creates a cache from the `[cache]` configuration section.
    pub fn from_config(config: &CacheConfig) -> Self {
        let cache = Self::new(config.max_size, Duration::from_millis(config.ttl_ms));
        match config.max_memory_bytes {
            Some(limit) => cache.with_memory_limit(limit, config.memory_warning_threshold),
            None => cache,
        }
    }

    /// Caps the total estimated size of cached values.
    ///
    /// `warning_threshold` is the fraction of `max_bytes` at which a single
    /// warning is logged; it is re-armed once usage drops back below it.
    pub fn with_memory_limit(mut self, max_bytes: usize, warning_threshold: f64) -> Self {
        self.max_memory_bytes = Some(max_bytes);
        self.memory_warning_threshold = warning_threshold.clamp(0.0, 1.0);
        self
    }

    // == Get ==
    /// Retrieves a value by key, promoting it to most recently used.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.counters.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.counters.record_miss();
            debug!(key = ?key, "Cache entry expired");
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.record_hit();
        let value = entry.value.clone();

        self.lru.touch(key);
        self.counters.record_hit();
        Some(value)
    }

    // == Set ==
    /// Stores a value, evicting least recently used entries as needed.
    ///
    /// Returns `false` without touching the cache when the value alone is
    /// larger than the memory ceiling.
    pub fn set(&mut self, key: K, value: V) -> bool {
        let size_bytes = estimate_size(&value);

        if let Some(limit) = self.max_memory_bytes {
            if size_bytes > limit {
                warn!(
                    key = ?key,
                    size_bytes,
                    limit,
                    "Value exceeds cache memory limit, not caching"
                );
                return false;
            }
        }

        // Overwrite: the previous value no longer counts towards any bound.
        // Pressure is only re-checked once the new value is in.
        self.detach_entry(&key);

        while !self.entries.is_empty() && self.needs_room_for(size_bytes) {
            let Some(oldest) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.memory_usage -= evicted.size_bytes;
            }
            self.counters.record_eviction();
            debug!(key = ?oldest, "Evicted least recently used cache entry");
        }

        self.memory_usage += size_bytes;
        self.entries
            .insert(key.clone(), CacheEntry::new(value, self.ttl, size_bytes));
        self.lru.touch(&key);
        self.check_memory_pressure();

        true
    }

    // == Has ==
    /// Checks for a live entry without affecting LRU order or metrics.
    ///
    /// An expired entry is removed, exactly as `get` would.
    pub fn has(&mut self, key: &K) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };

        if expired {
            self.remove_entry(key);
            return false;
        }
        true
    }

    // == Delete ==
    /// Removes an entry by key, returning whether it existed.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove_entry(key)
    }

    // == Clear ==
    /// Removes every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.memory_usage = 0;
        self.memory_warning_active = false;
    }

    // == Prune ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn prune(&mut self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        expired_keys.len()
    }

    // == Keys ==
    /// Returns all keys, least recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.lru.iter_oldest_first().cloned().collect()
    }

    /// Number of lookups an entry has served, if present.
    pub fn hit_count(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.hit_count)
    }

    // == Metrics ==
    /// Returns a snapshot of counters and occupancy.
    pub fn metrics(&self) -> CacheMetrics {
        self.counters.snapshot(self.entries.len(), self.memory_usage)
    }

    /// Zeroes hits, misses and evictions. Size and memory usage are live
    /// state and stay as they are.
    pub fn reset_metrics(&mut self) {
        self.counters = CacheCounters::default();
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    /// Number of rising-edge memory warnings emitted so far.
    pub fn memory_warnings(&self) -> u64 {
        self.memory_warnings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn needs_room_for(&self, incoming: usize) -> bool {
        self.entries.len() >= self.max_size
            || self
                .max_memory_bytes
                .is_some_and(|limit| self.memory_usage + incoming > limit)
    }

    fn remove_entry(&mut self, key: &K) -> bool {
        let removed = self.detach_entry(key);
        if removed {
            self.check_memory_pressure();
        }
        removed
    }

    /// Drops an entry and its accounting without touching the warning state.
    fn detach_entry(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(key);
                self.memory_usage -= entry.size_bytes;
                true
            }
            None => false,
        }
    }

    fn check_memory_pressure(&mut self) {
        let Some(limit) = self.max_memory_bytes else {
            return;
        };

        let threshold = limit as f64 * self.memory_warning_threshold;
        let above = self.memory_usage as f64 >= threshold;

        if above && !self.memory_warning_active {
            self.memory_warning_active = true;
            self.memory_warnings += 1;
            warn!(
                memory_usage = self.memory_usage,
                limit,
                threshold = self.memory_warning_threshold,
                "Cache memory usage crossed warning threshold"
            );
        } else if !above {
            self.memory_warning_active = false;
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_entry_bytes(&self) -> usize {
        self.entries.values().map(|entry| entry.size_bytes).sum()
    }
}
