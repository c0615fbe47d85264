//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Metrics ==
/// Snapshot of cache performance and occupancy.
///
/// `hits`, `misses` and `evictions` are monotonic counters that only go back
/// to zero through an explicit reset. `size` and `memory_usage` describe the
/// live contents of the cache at the time the snapshot was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted to make room for new ones
    pub evictions: u64,
    /// Current number of entries in the cache
    pub size: usize,
    /// Sum of the estimated sizes of all live entries, in bytes
    pub memory_usage: usize,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
}

// == Counters ==
/// Monotonic counters owned by the cache store.
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheCounters {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Combines the counters with the live occupancy figures.
    pub fn snapshot(&self, size: usize, memory_usage: usize) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size,
            memory_usage,
            hit_rate: self.hit_rate(),
        }
    }
}
