//! Error types for the result cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the result cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No fresh entry for the request (HTTP surface only; `get` returns `None`)
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Payload or value cannot be canonically serialized
    #[error("Unserializable payload: {0}")]
    Unserializable(String),

    /// A single entry is larger than what the memory budget can ever admit
    #[error("Entry of {required} bytes cannot fit in a memory budget of {budget} bytes")]
    EvictionExhausted { required: usize, budget: usize },

    /// Entry count ceiling reached and nothing is evictable
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Compression or decompression fault
    #[error("Compression error: {0}")]
    Compression(String),

    /// Durable tier I/O or format fault
    #[error("Durable store error: {0}")]
    Durable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Unserializable(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::EvictionExhausted { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::CacheFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Compression(_) | CacheError::Durable(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Unserializable(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
