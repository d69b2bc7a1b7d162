//! Cache Module
//!
//! Result cache with canonical keys, TTL classes, usefulness-scored eviction
//! and transparent compression of large values.

pub mod codec;
mod entry;
pub mod key;
mod scorer;
mod stats;
mod store;
mod ttl;


// Re-export public types
pub use codec::{CompressionCodec, GzipCodec};
pub use entry::{CacheEntry, EntrySnapshot, Priority, StoredValue};
pub use key::{build_key, CacheRequest, KeyBuilder};
pub use scorer::{EvictionScorer, EvictionTarget, PassLimits, ScoreWeights};
pub use stats::{CacheCounters, CacheStats, EntryStats};
pub use store::{CacheCore, SetOptions, SharedCache};
pub use ttl::TtlPolicy;
