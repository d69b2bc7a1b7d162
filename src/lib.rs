//! Memo Cache - a client-resident result cache
//!
//! Stores results of expensive remote operations keyed by resource and
//! canonical payload, with per-class TTLs, usefulness-scored eviction under a
//! memory budget, transparent compression of large values and an optional
//! write-behind durable tier for high-priority entries.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod durable;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheCore, CacheRequest, CacheStats, Priority, SetOptions, SharedCache};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::{spawn_maintenance, Maintenance, MaintenanceHandle};
