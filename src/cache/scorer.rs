//! Eviction Scorer Module
//!
//! Ranks entries by a composite usefulness score and picks eviction victims.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::cache::entry::{CacheEntry, Priority};

// == Score Weights ==
/// Weights of the usefulness score.
///
/// `score = ordinal * priority + accesses * frequency - (age / ttl) * age
///          - idle_minutes * recency - (size / size_unit) * size`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub priority: f64,
    pub frequency: f64,
    pub age: f64,
    pub recency: f64,
    pub size: f64,
    /// Bytes per size unit
    pub size_unit: usize,
}

impl Default for ScoreWeights {
    /// Priority dominates, then recency, then frequency, then size.
    fn default() -> Self {
        Self {
            priority: 1_000.0,
            frequency: 5.0,
            age: 20.0,
            recency: 10.0,
            size: 1.0,
            size_unit: 1024,
        }
    }
}

// == Eviction Target ==
/// What a pass has to free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionTarget {
    pub bytes: usize,
    pub entries: usize,
}

// == Pass Limits ==
/// Bounds of a single eviction pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassLimits {
    /// Entries a pass removes at minimum once it runs
    pub min_count: usize,
    /// Largest share of the current entry count one pass may remove
    pub max_fraction: f64,
}

impl Default for PassLimits {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_fraction: 0.5,
        }
    }
}

impl PassLimits {
    /// Hard cap on removals for a table of `total` entries; at least one.
    pub fn cap(&self, total: usize) -> usize {
        ((total as f64 * self.max_fraction).floor() as usize).max(1)
    }
}

// == Eviction Scorer ==
#[derive(Debug, Clone, Default)]
pub struct EvictionScorer {
    weights: ScoreWeights,
}

impl EvictionScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    // == Score ==
    /// Usefulness of an entry; lower is more evictable.
    pub fn score(&self, entry: &CacheEntry, now: DateTime<Utc>) -> f64 {
        let w = &self.weights;

        let ttl_secs = entry.ttl.as_secs_f64();
        let age_ratio = if ttl_secs > 0.0 {
            entry.age(now).as_secs_f64() / ttl_secs
        } else {
            1.0
        };
        let idle_minutes = entry.idle(now).as_secs_f64() / 60.0;
        let size_units = entry.size_bytes as f64 / w.size_unit.max(1) as f64;

        f64::from(entry.priority.ordinal()) * w.priority + entry.access_count as f64 * w.frequency
            - age_ratio * w.age
            - idle_minutes * w.recency
            - size_units * w.size
    }

    // == Select Victims ==
    /// Picks the keys one eviction pass removes, in removal order.
    ///
    /// Unexpired critical entries are never candidates. Candidates are taken
    /// in ascending score order until the target is met and at least
    /// `limits.min_count` were taken, or until `limits.cap(total)` were taken.
    pub fn select_victims<'a, I>(
        &self,
        entries: I,
        now: DateTime<Utc>,
        target: EvictionTarget,
        limits: PassLimits,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        let mut total = 0usize;
        let mut candidates: Vec<(f64, &CacheEntry)> = Vec::new();
        for entry in entries {
            total += 1;
            if entry.priority == Priority::Critical && !entry.is_expired(now) {
                continue;
            }
            candidates.push((self.score(entry, now), entry));
        }

        candidates.sort_by(|a, b| match a.0.total_cmp(&b.0) {
            Ordering::Equal => a.1.key.cmp(&b.1.key),
            other => other,
        });

        let cap = limits.cap(total);
        let min_count = limits.min_count.max(target.entries);
        let mut freed = 0usize;
        let mut victims = Vec::new();

        for (_, entry) in candidates {
            if victims.len() >= cap {
                break;
            }
            if freed >= target.bytes && victims.len() >= min_count {
                break;
            }
            freed += entry.size_bytes;
            victims.push(entry.key.clone());
        }

        victims
    }
}
