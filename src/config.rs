//! Configuration Module
//!
//! Handles loading and managing cache and server configuration from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::cache::key::DEFAULT_VOLATILE_FIELDS;
use crate::cache::{PassLimits, ScoreWeights, TtlPolicy};

// == Cache Config ==
/// Tunables of a cache instance. Every field has a documented default.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Ordered `(class pattern, ttl)` table, first match wins
    /// (default: `/api/optimize` 10 min, `/api/parse` 30 min)
    pub ttl_classes: Vec<(String, Duration)>,
    /// TTL when no class matches (default: 5 min)
    pub default_ttl: Duration,
    /// Maximum number of entries (default: 1000)
    pub max_entries: usize,
    /// Memory budget in bytes (default: 10 MiB)
    pub max_memory_bytes: usize,
    /// Values whose serialized size exceeds this are compressed (default: 8 KiB)
    pub compression_threshold: usize,
    /// Only entries smaller than this are written durably (default: 64 KiB)
    pub persist_max_bytes: usize,
    /// Bounds of one eviction pass (default: min 1, at most half the entries)
    pub eviction: PassLimits,
    /// Usefulness score weights
    pub weights: ScoreWeights,
    /// Payload fields ignored by key derivation
    pub volatile_fields: Vec<String>,
    /// Expiry sweep period (default: 60 s)
    pub sweep_interval: Duration,
    /// Memory pressure check period (default: 30 s)
    pub pressure_interval: Duration,
    /// Usage ratio that triggers a pressure pass (default: 0.8)
    pub high_watermark: f64,
    /// Usage ratio a pressure pass evicts down to (default: 0.6)
    pub low_watermark: f64,
    /// Prefix of every durable record key (default: `memo`)
    pub durable_namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_classes: vec![
                ("/api/optimize".to_string(), Duration::from_secs(600)),
                ("/api/parse".to_string(), Duration::from_secs(1800)),
            ],
            default_ttl: Duration::from_secs(300),
            max_entries: 1000,
            max_memory_bytes: 10 * 1024 * 1024,
            compression_threshold: 8 * 1024,
            persist_max_bytes: 64 * 1024,
            eviction: PassLimits::default(),
            weights: ScoreWeights::default(),
            volatile_fields: DEFAULT_VOLATILE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            sweep_interval: Duration::from_secs(60),
            pressure_interval: Duration::from_secs(30),
            high_watermark: 0.8,
            low_watermark: 0.6,
            durable_namespace: "memo".to_string(),
        }
    }
}

impl CacheConfig {
    /// Builds the TTL policy described by this config.
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::from_classes(self.ttl_classes.iter().cloned(), self.default_ttl)
    }
}

// == Config ==
/// Process configuration: the cache plus the HTTP surface hosting it.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub cache: CacheConfig,
    /// HTTP server port
    pub server_port: u16,
    /// Directory of the file-backed durable tier; `None` disables it
    pub durable_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            server_port: 3000,
            durable_dir: None,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMO_TTL_TABLE` - `pattern=secs,pattern=secs` in match order
    /// - `MEMO_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `MEMO_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `MEMO_MAX_MEMORY` - Memory budget in bytes (default: 10485760)
    /// - `MEMO_COMPRESSION_THRESHOLD` - Bytes (default: 8192)
    /// - `MEMO_PERSIST_MAX_BYTES` - Bytes (default: 65536)
    /// - `MEMO_EVICTION_MAX_FRACTION` - Pass cap as a fraction (default: 0.5)
    /// - `MEMO_EVICTION_MIN_BATCH` - Pass minimum (default: 1)
    /// - `MEMO_SWEEP_INTERVAL` - Seconds (default: 60)
    /// - `MEMO_PRESSURE_INTERVAL` - Seconds (default: 30)
    /// - `MEMO_HIGH_WATERMARK` / `MEMO_LOW_WATERMARK` - Ratios (default: 0.8 / 0.6)
    /// - `MEMO_DURABLE_NAMESPACE` - Durable key prefix (default: memo)
    /// - `MEMO_DURABLE_DIR` - Durable directory (default: none)
    /// - `MEMO_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let d = &defaults.cache;
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<f64>().ok());
        let secs = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let count = |name: &str, default: usize| {
            lookup(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let cache = CacheConfig {
            ttl_classes: lookup("MEMO_TTL_TABLE")
                .map(|v| parse_ttl_table(&v))
                .unwrap_or_else(|| d.ttl_classes.clone()),
            default_ttl: secs("MEMO_DEFAULT_TTL", d.default_ttl),
            max_entries: count("MEMO_MAX_ENTRIES", d.max_entries),
            max_memory_bytes: count("MEMO_MAX_MEMORY", d.max_memory_bytes),
            compression_threshold: count("MEMO_COMPRESSION_THRESHOLD", d.compression_threshold),
            persist_max_bytes: count("MEMO_PERSIST_MAX_BYTES", d.persist_max_bytes),
            eviction: PassLimits {
                min_count: count("MEMO_EVICTION_MIN_BATCH", d.eviction.min_count),
                max_fraction: parsed("MEMO_EVICTION_MAX_FRACTION")
                    .unwrap_or(d.eviction.max_fraction),
            },
            weights: d.weights,
            volatile_fields: d.volatile_fields.clone(),
            sweep_interval: secs("MEMO_SWEEP_INTERVAL", d.sweep_interval),
            pressure_interval: secs("MEMO_PRESSURE_INTERVAL", d.pressure_interval),
            high_watermark: parsed("MEMO_HIGH_WATERMARK").unwrap_or(d.high_watermark),
            low_watermark: parsed("MEMO_LOW_WATERMARK").unwrap_or(d.low_watermark),
            durable_namespace: lookup("MEMO_DURABLE_NAMESPACE")
                .unwrap_or_else(|| d.durable_namespace.clone()),
        };

        Self {
            cache,
            server_port: lookup("MEMO_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.server_port),
            durable_dir: lookup("MEMO_DURABLE_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// Parses `pattern=secs,pattern=secs`, keeping order. Malformed items are skipped.
pub fn parse_ttl_table(raw: &str) -> Vec<(String, Duration)> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let parsed = item.rsplit_once('=').and_then(|(pattern, secs)| {
                let secs = secs.trim().parse::<u64>().ok()?;
                let pattern = pattern.trim();
                (!pattern.is_empty()).then(|| (pattern.to_string(), Duration::from_secs(secs)))
            });
            if parsed.is_none() {
                warn!("Ignoring malformed TTL table item '{}'", item);
            }
            parsed
        })
        .collect()
}
