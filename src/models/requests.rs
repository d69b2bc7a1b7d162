//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{CacheRequest, Priority, SetOptions};

/// Maximum accepted length of a resource identifier.
const MAX_RESOURCE_LEN: usize = 2048;

/// Request body for the set operation (PUT /entries)
///
/// # Fields
/// - `resource_id`: Resource the result belongs to
/// - `payload`: Optional request payload the result was computed from
/// - `isolation`: Optional isolation context (tenant, account, ...)
/// - `value`: The result to store
/// - `ttl`: Optional TTL in seconds (class TTL if not specified)
/// - `priority`: Optional priority (`medium` if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub resource_id: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub isolation: Option<String>,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_resource(&self.resource_id)
    }

    /// Identity of the entry being stored.
    pub fn cache_request(&self) -> CacheRequest {
        build_request(&self.resource_id, &self.payload, &self.isolation)
    }

    /// Per-call options; absent fields fall back to the cache defaults.
    pub fn options(&self) -> SetOptions {
        let mut options = SetOptions::new();
        if let Some(secs) = self.ttl {
            options = options.with_ttl(Duration::from_secs(secs));
        }
        if let Some(priority) = self.priority {
            options = options.with_priority(priority);
        }
        options
    }
}

/// Request body addressing one entry (lookup, exists, invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct LookupRequest {
    pub resource_id: String,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub isolation: Option<String>,
}

impl LookupRequest {
    pub fn validate(&self) -> Option<String> {
        validate_resource(&self.resource_id)
    }

    pub fn cache_request(&self) -> CacheRequest {
        build_request(&self.resource_id, &self.payload, &self.isolation)
    }
}

/// Query string of DELETE /entries
#[derive(Debug, Clone, Deserialize)]
pub struct PatternQuery {
    /// Substring of the source identifier to invalidate
    pub pattern: String,
}

impl PatternQuery {
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

fn validate_resource(resource_id: &str) -> Option<String> {
    if resource_id.trim().is_empty() {
        return Some("Resource id cannot be empty".to_string());
    }
    if resource_id.len() > MAX_RESOURCE_LEN {
        return Some(format!(
            "Resource id exceeds maximum length of {} characters",
            MAX_RESOURCE_LEN
        ));
    }
    None
}

fn build_request(
    resource_id: &str,
    payload: &Option<Value>,
    isolation: &Option<String>,
) -> CacheRequest {
    let mut request = CacheRequest::new(resource_id);
    if let Some(payload) = payload {
        request = request.with_payload(payload.clone());
    }
    if let Some(context) = isolation.as_deref().filter(|c| !c.is_empty()) {
        request = request.with_isolation(context);
    }
    request
}
