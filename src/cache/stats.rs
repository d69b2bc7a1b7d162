//! Cache Statistics Module
//!
//! Tracks cache performance counters and builds observability snapshots.

use serde::Serialize;

use crate::cache::entry::Priority;

// == Cache Counters ==
/// Running counters owned by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCounters {
    /// Successful reads
    pub hits: u64,
    /// Reads that found nothing, an expired entry or a corrupt entry
    pub misses: u64,
    /// Entries removed by pressure eviction
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Entries dropped because their compressed bytes could not be decoded
    pub corrupt_drops: u64,
}

impl CacheCounters {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates hits / (hits + misses), or 0.0 if nothing was read yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_corrupt_drop(&mut self) {
        self.corrupt_drops += 1;
    }
}

// == Entry Stats ==
/// Read-only view of one entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryStats {
    pub key: String,
    pub source_identifier: String,
    pub priority: Priority,
    pub size_bytes: usize,
    pub access_count: u64,
    pub age_ms: u64,
    pub ttl_remaining_ms: u64,
    pub compressed: bool,
    pub persisted: bool,
    /// Current usefulness score (lower = evicted sooner)
    pub score: f64,
}

// == Cache Stats ==
/// Read-only snapshot of the whole cache.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub count: usize,
    pub memory_usage: usize,
    /// Maximum entry count
    pub capacity: usize,
    pub max_memory: usize,
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub corrupt_drops: u64,
    pub per_entry: Vec<EntryStats>,
}

impl CacheStats {
    /// Looks up one entry of the snapshot by key.
    pub fn entry(&self, key: &str) -> Option<&EntryStats> {
        self.per_entry.iter().find(|e| e.key == key)
    }
}
