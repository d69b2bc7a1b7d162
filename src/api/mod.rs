//! API Module
//!
//! HTTP handlers and routing for the cache server REST API.
//!
//! # Endpoints
//! - `PUT /entries` - Store a result
//! - `POST /entries/lookup` - Retrieve a fresh result
//! - `POST /entries/exists` - Check for a fresh result
//! - `POST /entries/invalidate` - Remove one result
//! - `DELETE /entries?pattern=` - Remove results by source pattern
//! - `DELETE /entries/all` - Remove every result
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
