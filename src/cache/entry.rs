//! Cache Entry Module
//!
//! Defines a cached result with its expiry, priority and access metadata.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::elapsed_between;

// == Priority ==
/// Eviction resistance of an entry. Ordinal: higher survives longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    /// Never removed by pressure eviction, only by expiry or explicit removal.
    Critical,
}

impl Priority {
    /// Ordinal used by the usefulness score.
    pub fn ordinal(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

// == Stored Value ==
/// In-memory representation of a cached value.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Plain(Value),
    Compressed(Vec<u8>),
}

// == Cache Entry ==
/// Represents a single cached result with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Canonical key
    pub key: String,
    /// The cached value or its compressed bytes
    pub value: StoredValue,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time to live from `created_at`
    pub ttl: Duration,
    /// Eviction resistance
    pub priority: Priority,
    /// Number of successful reads
    pub access_count: u64,
    /// Time of the last successful read (or creation)
    pub last_accessed_at: DateTime<Utc>,
    /// Estimated footprint, counted in the cache's memory usage
    pub size_bytes: usize,
    /// Normalized resource the entry belongs to
    pub source_identifier: String,
    /// Whether the durable tier holds a copy
    pub persisted: bool,
}

impl CacheEntry {
    // == Is Expired ==
    /// An entry is expired once strictly more than `ttl` has elapsed since creation.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.ttl
    }

    /// Time since creation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.created_at, now)
    }

    /// Time since the last successful read.
    pub fn idle(&self, now: DateTime<Utc>) -> Duration {
        elapsed_between(self.last_accessed_at, now)
    }

    /// Remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.ttl.saturating_sub(self.age(now))
    }

    // == Touch ==
    /// Records a successful read.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed_at = now;
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.value, StoredValue::Compressed(_))
    }
}

// == Entry Snapshot ==
/// Durable record of an entry, written as JSON by the durable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub key: String,
    pub source_identifier: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub priority: Priority,
}

impl EntrySnapshot {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// A snapshot is still usable while `now - created_at < ttl`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.created_at, now) < self.ttl()
    }
}
