//! Cache Core Module
//!
//! Entry table with memory accounting, TTL expiry, usefulness-scored eviction,
//! compression of large values and write-through to the durable tier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheCounters, CacheEntry, CacheRequest, CacheStats, CompressionCodec, EntrySnapshot,
    EntryStats, EvictionScorer, EvictionTarget, GzipCodec, KeyBuilder, Priority, StoredValue,
    TtlPolicy,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::durable::DurableTier;
use crate::error::{CacheError, Result};

/// Cache shared between foreground callers and background maintenance.
///
/// The lock is the single point of serialization for every table mutation.
pub type SharedCache = Arc<RwLock<CacheCore>>;

// == Set Options ==
/// Per-call options of [`CacheCore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overrides the TTL policy for this entry
    pub ttl: Option<Duration>,
    pub priority: Priority,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// Why an entry leaves the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Expired,
    Evicted,
    Corrupt,
    Invalidated,
}

// == Cache Core ==
/// Owner of the entry table and the memory counter.
pub struct CacheCore {
    entries: HashMap<String, CacheEntry>,
    /// Always the sum of `size_bytes` over `entries`
    memory_usage: usize,
    counters: CacheCounters,
    config: CacheConfig,
    keys: KeyBuilder,
    ttl: TtlPolicy,
    scorer: EvictionScorer,
    codec: Box<dyn CompressionCodec>,
    clock: Arc<dyn Clock>,
    durable: Option<DurableTier>,
}

impl std::fmt::Debug for CacheCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCore")
            .field("entries", &self.entries.len())
            .field("memory_usage", &self.memory_usage)
            .field("counters", &self.counters)
            .field("codec", &self.codec.name())
            .field("durable", &self.durable)
            .finish()
    }
}

impl CacheCore {
    // == Constructor ==
    /// Creates an empty cache on the system clock with gzip compression and
    /// no durable tier.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            memory_usage: 0,
            counters: CacheCounters::new(),
            keys: KeyBuilder::with_volatile_fields(config.volatile_fields.iter().cloned()),
            ttl: config.ttl_policy(),
            scorer: EvictionScorer::new(config.weights),
            codec: Box::new(GzipCodec::default()),
            clock: Arc::new(SystemClock),
            durable: None,
            config,
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the compression codec.
    pub fn with_codec(mut self, codec: Box<dyn CompressionCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Attaches a durable tier and loads its live records.
    ///
    /// Call after [`CacheCore::with_clock`] so rehydration sees the right time.
    pub fn with_durable(mut self, tier: DurableTier) -> Self {
        self.durable = Some(tier);
        self.rehydrate();
        self
    }

    /// Wraps the cache for sharing with maintenance and request handlers.
    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    // == Key For ==
    /// Canonical key of a request.
    pub fn key_for(&self, request: &CacheRequest) -> String {
        self.keys.build(request)
    }

    // == Set ==
    /// Stores `value` for `request`.
    ///
    /// Evicts by usefulness score first when the entry count or memory budget
    /// would be exceeded, compresses values above the compression threshold,
    /// replaces any previous entry and writes important small entries to the
    /// durable tier.
    ///
    /// # Errors
    /// - `Unserializable` if `value` has no JSON form; nothing changes
    /// - `EvictionExhausted` if the entry cannot fit the memory budget even
    ///   after evicting everything evictable; nothing changes
    /// - `CacheFull` if the entry count is at its ceiling and only unexpired
    ///   critical entries remain
    pub fn set<V>(&mut self, request: &CacheRequest, value: &V, options: SetOptions) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        let key = self.key_for(request);
        let source_identifier = request.source_identifier();
        let ttl = options
            .ttl
            .unwrap_or_else(|| self.ttl.ttl_for(&source_identifier));
        let now = self.clock.now();

        let (stored, stored_len) = self.encode(&key, &value)?;
        let size_bytes = key.len() + stored_len;
        if size_bytes > self.config.max_memory_bytes {
            return Err(CacheError::EvictionExhausted {
                required: size_bytes,
                budget: self.config.max_memory_bytes,
            });
        }

        self.make_room(&key, size_bytes, now)?;

        let persist = self.durable.is_some()
            && options.priority >= Priority::High
            && size_bytes < self.config.persist_max_bytes;

        if let Some(previous) = self.detach(&key) {
            if previous.persisted && !persist {
                self.durable_delete(&key);
            }
        }

        if persist {
            if let Some(tier) = &self.durable {
                tier.put(&EntrySnapshot {
                    key: key.clone(),
                    source_identifier: source_identifier.clone(),
                    value,
                    created_at: now,
                    ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
                    priority: options.priority,
                });
            }
        }

        debug!(
            key = %key,
            size = size_bytes,
            priority = ?options.priority,
            ttl_secs = ttl.as_secs(),
            "Cache set"
        );

        self.attach(CacheEntry {
            key,
            value: stored,
            created_at: now,
            ttl,
            priority: options.priority,
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
            source_identifier,
            persisted: persist,
        });

        Ok(())
    }

    // == Get ==
    /// Returns the cached value for `request`, or `None` on a miss.
    ///
    /// Expired and undecodable entries are removed and reported as misses.
    pub fn get(&mut self, request: &CacheRequest) -> Option<Value> {
        let key = self.key_for(request);
        self.get_by_key(&key)
    }

    /// Same as [`CacheCore::get`] for an already derived key.
    pub fn get_by_key(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now();

        let decoded = match self.entries.get(key) {
            None => {
                self.counters.record_miss();
                return None;
            }
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => Some(match &entry.value {
                StoredValue::Plain(value) => Ok(value.clone()),
                StoredValue::Compressed(bytes) => self.codec.decompress(bytes),
            }),
        };

        match decoded {
            None => {
                self.remove_entry(key, Removal::Expired);
                self.counters.record_miss();
                None
            }
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Dropping corrupt cache entry");
                self.remove_entry(key, Removal::Corrupt);
                self.counters.record_miss();
                None
            }
            Some(Ok(value)) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.touch(now);
                }
                self.counters.record_hit();
                Some(value)
            }
        }
    }

    /// Typed [`CacheCore::get`]. A value that does not decode as `T` is a miss.
    pub fn get_as<T: DeserializeOwned>(&mut self, request: &CacheRequest) -> Option<T> {
        let value = self.get(request)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(
                    resource = %request.resource_id,
                    error = %e,
                    "Cached value has another shape"
                );
                None
            }
        }
    }

    // == Has ==
    /// Whether a fresh entry exists. Touches neither access statistics nor the table.
    ///
    /// Compressed bytes are not decoded here, so an entry whose payload is
    /// corrupt still reports `true` until a [`CacheCore::get`] drops it.
    pub fn has(&self, request: &CacheRequest) -> bool {
        let now = self.clock.now();
        self.entries
            .get(&self.key_for(request))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Invalidate ==
    /// Removes the entry for `request`. Returns whether one existed.
    pub fn invalidate(&mut self, request: &CacheRequest) -> bool {
        let key = self.key_for(request);
        self.remove_entry(&key, Removal::Invalidated).is_some()
    }

    /// Removes every entry whose source identifier contains `pattern`.
    pub fn invalidate_pattern(&mut self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.source_identifier.contains(pattern))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &keys {
            self.remove_entry(key, Removal::Invalidated);
        }

        info!("Invalidated {} entries matching '{}'", keys.len(), pattern);
        keys.len()
    }

    // == Clear ==
    /// Removes every entry and clears the durable tier.
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.memory_usage = 0;
        if let Some(tier) = &self.durable {
            tier.clear();
        }
        info!("Cache cleared ({} entries)", removed);
    }

    // == Stats ==
    /// Read-only snapshot for observability.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let mut per_entry: Vec<EntryStats> = self
            .entries
            .values()
            .map(|entry| EntryStats {
                key: entry.key.clone(),
                source_identifier: entry.source_identifier.clone(),
                priority: entry.priority,
                size_bytes: entry.size_bytes,
                access_count: entry.access_count,
                age_ms: millis(entry.age(now)),
                ttl_remaining_ms: millis(entry.ttl_remaining(now)),
                compressed: entry.is_compressed(),
                persisted: entry.persisted,
                score: self.scorer.score(entry, now),
            })
            .collect();
        per_entry.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            count: self.entries.len(),
            memory_usage: self.memory_usage,
            capacity: self.config.max_entries,
            max_memory: self.config.max_memory_bytes,
            hit_rate: self.counters.hit_rate(),
            hits: self.counters.hits,
            misses: self.counters.misses,
            evictions: self.counters.evictions,
            expirations: self.counters.expirations,
            corrupt_drops: self.counters.corrupt_drops,
            per_entry,
        }
    }

    // == Purge Expired ==
    /// Removes every expired entry. Returns the number removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key, Removal::Expired);
        }
        expired.len()
    }

    // == Relieve Pressure ==
    /// Runs one capped eviction pass down to the low watermark once memory
    /// usage is above the high watermark. Returns the number evicted.
    pub fn relieve_pressure(&mut self) -> usize {
        let budget = self.config.max_memory_bytes as f64;
        let high = (budget * self.config.high_watermark) as usize;
        if self.memory_usage <= high {
            return 0;
        }

        let low = (budget * self.config.low_watermark) as usize;
        let target = EvictionTarget {
            bytes: self.memory_usage.saturating_sub(low),
            entries: 0,
        };
        let now = self.clock.now();
        let victims = self.scorer.select_victims(
            self.entries.values(),
            now,
            target,
            self.config.eviction,
        );

        for key in &victims {
            self.remove_entry(key, Removal::Evicted);
        }

        info!(
            "Pressure pass evicted {} entries, memory now {} / {} bytes",
            victims.len(),
            self.memory_usage,
            self.config.max_memory_bytes
        );
        victims.len()
    }

    // == Accessors ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_usage
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolves once every durable op queued so far is applied; `None`
    /// without a durable tier.
    pub fn durable_barrier(&self) -> Option<oneshot::Receiver<()>> {
        self.durable.as_ref().map(DurableTier::barrier)
    }

    // == Rehydrate ==
    /// Loads live durable records into the table with neutral priority and
    /// access state. Returns the number loaded.
    pub fn rehydrate(&mut self) -> usize {
        let now = self.clock.now();
        let Some(tier) = &self.durable else {
            return 0;
        };
        let batch = tier.rehydrate(now);

        let mut loaded = 0;
        for snapshot in batch.live {
            if self.entries.contains_key(&snapshot.key) {
                continue;
            }
            let (stored, stored_len) = match self.encode(&snapshot.key, &snapshot.value) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(key = %snapshot.key, error = %e, "Skipping durable record");
                    continue;
                }
            };
            let size_bytes = snapshot.key.len() + stored_len;
            if self.entries.len() >= self.config.max_entries
                || self.memory_usage + size_bytes > self.config.max_memory_bytes
            {
                warn!(key = %snapshot.key, "No room for durable record, discarding it");
                self.durable_delete(&snapshot.key);
                continue;
            }

            self.attach(CacheEntry {
                ttl: snapshot.ttl(),
                key: snapshot.key,
                value: stored,
                created_at: snapshot.created_at,
                priority: Priority::Medium,
                access_count: 0,
                last_accessed_at: now,
                size_bytes,
                source_identifier: snapshot.source_identifier,
                persisted: true,
            });
            loaded += 1;
        }
        loaded
    }

    // == Internals ==

    /// Serializes and, above the threshold, compresses a value.
    /// Returns the stored form and its byte length.
    fn encode(&self, key: &str, value: &Value) -> Result<(StoredValue, usize)> {
        let raw_len = serde_json::to_vec(value)?.len();
        if raw_len <= self.config.compression_threshold {
            return Ok((StoredValue::Plain(value.clone()), raw_len));
        }

        match self.codec.compress(value) {
            Ok(bytes) => {
                debug!(
                    key = %key,
                    codec = self.codec.name(),
                    raw = raw_len,
                    packed = bytes.len(),
                    "Compressed value"
                );
                let len = bytes.len();
                Ok((StoredValue::Compressed(bytes), len))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Compression failed, storing uncompressed");
                Ok((StoredValue::Plain(value.clone()), raw_len))
            }
        }
    }

    /// Evicts until an entry of `size_bytes` under `key` fits both ceilings.
    fn make_room(&mut self, key: &str, size_bytes: usize, now: DateTime<Utc>) -> Result<()> {
        if self.room_needed(key, size_bytes) == EvictionTarget::default() {
            return Ok(());
        }

        let expired = self.purge_expired();
        if expired > 0 {
            debug!("Purged {} expired entries before eviction", expired);
        }

        let needed = self.room_needed(key, size_bytes);
        if needed == EvictionTarget::default() {
            return Ok(());
        }

        // Everything still here is unexpired, so only non-critical entries can go.
        let (evictable_bytes, evictable_count) = self
            .entries
            .values()
            .filter(|entry| entry.key != key && entry.priority != Priority::Critical)
            .fold((0usize, 0usize), |(bytes, count), entry| {
                (bytes + entry.size_bytes, count + 1)
            });

        if needed.bytes > evictable_bytes {
            return Err(CacheError::EvictionExhausted {
                required: size_bytes,
                budget: self.config.max_memory_bytes,
            });
        }
        if needed.entries > evictable_count {
            return Err(CacheError::CacheFull(format!(
                "{} entries, none evictable",
                self.entries.len()
            )));
        }

        let mut evicted = 0;
        let mut needed = needed;
        while needed != EvictionTarget::default() {
            let victims = self.scorer.select_victims(
                self.entries.values().filter(|entry| entry.key != key),
                now,
                needed,
                self.config.eviction,
            );
            if victims.is_empty() {
                break;
            }
            for victim in &victims {
                self.remove_entry(victim, Removal::Evicted);
            }
            evicted += victims.len();
            needed = self.room_needed(key, size_bytes);
        }
        if needed != EvictionTarget::default() {
            return Err(CacheError::EvictionExhausted {
                required: size_bytes,
                budget: self.config.max_memory_bytes,
            });
        }

        info!(
            "Evicted {} entries to admit {} bytes (memory {} / {})",
            evicted, size_bytes, self.memory_usage, self.config.max_memory_bytes
        );
        Ok(())
    }

    /// Bytes and entries that must go before `key` can hold `size_bytes`.
    fn room_needed(&self, key: &str, size_bytes: usize) -> EvictionTarget {
        let existing = self.entries.get(key).map(|entry| entry.size_bytes);
        let projected = self.memory_usage - existing.unwrap_or(0) + size_bytes;
        let entries = match existing {
            Some(_) => 0,
            None => (self.entries.len() + 1).saturating_sub(self.config.max_entries),
        };

        EvictionTarget {
            bytes: projected.saturating_sub(self.config.max_memory_bytes),
            entries,
        }
    }

    /// Inserts an entry and accounts for it.
    fn attach(&mut self, entry: CacheEntry) {
        self.memory_usage += entry.size_bytes;
        if let Some(previous) = self.entries.insert(entry.key.clone(), entry) {
            self.memory_usage -= previous.size_bytes;
        }
    }

    /// Removes an entry and its accounting, leaving the durable tier alone.
    fn detach(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.memory_usage -= entry.size_bytes;
        Some(entry)
    }

    /// Full teardown: table, accounting, counters and durable record.
    fn remove_entry(&mut self, key: &str, cause: Removal) -> Option<CacheEntry> {
        let entry = self.detach(key)?;

        match cause {
            Removal::Expired => self.counters.record_expiration(),
            Removal::Evicted => self.counters.record_eviction(),
            Removal::Corrupt => self.counters.record_corrupt_drop(),
            Removal::Invalidated => {}
        }
        if entry.persisted {
            self.durable_delete(key);
        }

        debug!(key = %key, cause = ?cause, "Cache entry removed");
        Some(entry)
    }

    fn durable_delete(&self, key: &str) {
        if let Some(tier) = &self.durable {
            tier.delete(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn recount_memory(&self) -> usize {
        self.entries.values().map(|entry| entry.size_bytes).sum()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_entry(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = StoredValue::Compressed(b"\x1f\x8b garbage".to_vec());
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
