//! Background Tasks Module
//!
//! Contains background work that runs periodically alongside the cache.
//!
//! # Tasks
//! - Expiry sweep: removes expired entries
//! - Pressure check: evicts down to the low watermark above the high watermark

mod maintenance;

pub use maintenance::{spawn_maintenance, Maintenance, MaintenanceHandle, TickReport};
