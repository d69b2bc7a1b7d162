//! Durable Tier Module
//!
//! Best-effort persistence of small, important entries across restarts.
//!
//! # Components
//! - `DurableStore`: key/value backend with prefix enumeration
//! - `MemoryStore`, `FileStore`: bundled backends
//! - `DurableTier` / `DurableWriter`: write-behind queue between the cache and a backend

mod store;
mod tier;

pub use store::{DurableStore, FileStore, MemoryStore};
pub use tier::{channel, DurableOp, DurableTier, DurableWriter, Rehydrated};
