//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::debug;

use crate::cache::{CacheCore, CacheStats, SharedCache};
use crate::error::{CacheError, Result};
use crate::models::{
    GetResponse, HasResponse, HealthResponse, InvalidateResponse, LookupRequest, PatternQuery,
    SetRequest, SetResponse,
};

/// Application state shared across all handlers.
///
/// Contains the cache wrapped in Arc<RwLock<>> for thread-safe access.
#[derive(Clone)]
pub struct AppState {
    pub cache: SharedCache,
}

impl AppState {
    /// Creates a new AppState owning the given cache.
    pub fn new(cache: CacheCore) -> Self {
        Self::from_shared(cache.into_shared())
    }

    /// Creates a new AppState over a cache shared with other tasks.
    pub fn from_shared(cache: SharedCache) -> Self {
        Self { cache }
    }
}

/// Handler for PUT /entries
///
/// Stores a result for a resource and payload.
///
/// # Errors
/// - `InvalidRequest` for an empty or oversized resource id
/// - `EvictionExhausted` when the value can never fit the memory budget
/// - `CacheFull` when the entry ceiling is reached and nothing is evictable
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let request = req.cache_request();
    let mut cache = state.cache.write().await;
    let key = cache.key_for(&request);
    cache.set(&request, &req.value, req.options())?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for POST /entries/lookup
///
/// Returns the fresh value stored for the request, 404 otherwise.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<GetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let request = req.cache_request();
    // Write lock: a hit updates access bookkeeping, a stale hit removes the entry
    let mut cache = state.cache.write().await;
    let key = cache.key_for(&request);
    match cache.get(&request) {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => {
            debug!(key = %key, "Cache miss");
            Err(CacheError::NotFound(key))
        }
    }
}

/// Handler for POST /entries/exists
pub async fn exists_handler(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<HasResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let request = req.cache_request();
    let cache = state.cache.read().await;

    Ok(Json(HasResponse {
        key: cache.key_for(&request),
        exists: cache.has(&request),
    }))
}

/// Handler for POST /entries/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut cache = state.cache.write().await;
    let removed = cache.invalidate(&req.cache_request());

    Ok(Json(InvalidateResponse::new(usize::from(removed))))
}

/// Handler for DELETE /entries?pattern=...
///
/// Removes every entry whose source identifier contains the pattern.
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut cache = state.cache.write().await;
    let removed = cache.invalidate_pattern(&query.pattern);

    Ok(Json(InvalidateResponse::new(removed)))
}

/// Handler for DELETE /entries/all
pub async fn clear_handler(State(state): State<AppState>) -> Json<InvalidateResponse> {
    let mut cache = state.cache.write().await;
    let removed = cache.len();
    cache.clear();

    Json(InvalidateResponse::new(removed))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    // Acquire read lock for stats
    let cache = state.cache.read().await;
    Json(cache.stats())
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
