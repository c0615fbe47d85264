//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, LRU eviction and an
//! optional memory ceiling.

mod entry;
mod lru;
mod size;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use size::{estimate_size, MAX_SIZE_DEPTH};
pub use stats::CacheMetrics;
pub use store::LruCache;

// == Public Constants ==
/// Default maximum number of cached entries
pub const DEFAULT_MAX_SIZE: usize = 500;

/// Default entry lifetime in milliseconds (1 hour)
pub const DEFAULT_TTL_MS: u64 = 60 * 60 * 1000;

/// Default fraction of the memory ceiling that triggers a warning
pub const DEFAULT_MEMORY_WARNING_THRESHOLD: f64 = 0.9;
