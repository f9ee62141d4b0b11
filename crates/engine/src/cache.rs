//! Query result cache
//!
//! Memoizes the ordered result of a normalised query. The cache lives
//! exactly one mutation epoch: every add, delete and relocation clears it
//! wholesale.
//!
//! ## Capacity
//!
//! The cache holds at most `capacity` entries. Once full it rejects new
//! entries (counted in [`CacheStats::rejected`]) until the next
//! invalidation empties it; nothing is evicted. A capacity of 0 disables
//! caching while still counting hits and misses.

use rustc_hash::FxHashMap;
use setdex_core::{QueryKey, RecordId};
use tracing::{debug, trace};

/// Default maximum number of cached queries
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Memoized query results of one registry
#[derive(Debug, Clone)]
pub struct QueryCache {
    capacity: usize,
    entries: FxHashMap<QueryKey, Vec<RecordId>>,
    hits: u64,
    misses: u64,
    rejected: u64,
}

impl QueryCache {
    /// Create an empty cache holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: FxHashMap::default(),
            hits: 0,
            misses: 0,
            rejected: 0,
        }
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached queries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached result for `key`, counting a hit or a miss
    pub fn lookup(&mut self, key: &QueryKey) -> Option<Vec<RecordId>> {
        match self.entries.get(key) {
            Some(ids) => {
                self.hits += 1;
                trace!(target: "setdex::cache", results = ids.len(), "Cache hit");
                Some(ids.clone())
            }
            None => {
                self.misses += 1;
                trace!(target: "setdex::cache", "Cache miss");
                None
            }
        }
    }

    /// Remember `ids` as the result of `key`
    ///
    /// Returns `false` if the cache is full and the entry was rejected.
    pub fn store(&mut self, key: QueryKey, ids: &[RecordId]) -> bool {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.rejected += 1;
            debug!(target: "setdex::cache", capacity = self.capacity, "Cache full, result not stored");
            return false;
        }
        self.entries.insert(key, ids.to_vec());
        true
    }

    /// Drop every entry
    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            debug!(target: "setdex::cache", entries = self.entries.len(), "Cache invalidated");
            self.entries.clear();
        }
    }

    /// Hit/miss statistics
    pub fn stats(&self) -> CacheStats {
        let total_queries = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate: if total_queries > 0 {
                (self.hits as f64 / total_queries as f64 * 10_000.0).round() / 100.0
            } else {
                0.0
            },
            total_queries,
            entries: self.entries.len(),
            rejected: self.rejected,
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Query cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    /// Queries answered from the cache
    pub hits: u64,
    /// Queries that had to be evaluated
    pub misses: u64,
    /// Hits as a percentage of all queries, rounded to 2 decimals
    pub hit_rate: f64,
    /// hits + misses
    pub total_queries: u64,
    /// Entries currently cached
    pub entries: usize,
    /// Results not stored because the cache was full
    pub rejected: u64,
}
