//! Key Builder Module
//!
//! Derives a canonical, stable cache key for a logical request.
//!
//! A key has the shape `<scope>::<resource>[#<digest>]` where `scope` is empty
//! for unscoped requests and `<len>:<context>` for an isolation context of
//! `len` bytes, `resource` is the resource identifier with volatile suffixes
//! removed and `digest` is a SHA-256 prefix of the canonical request payload.
//! The length prefix keeps contexts containing `::` from colliding with other
//! scopes or resources.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

// == Public Constants ==
/// Payload fields that never contribute to a key.
pub const DEFAULT_VOLATILE_FIELDS: &[&str] = &[
    "timestamp",
    "ts",
    "requestId",
    "request_id",
    "sessionId",
    "session_id",
    "nonce",
    "traceId",
    "trace_id",
];

/// Number of hex characters of the payload digest kept in the key.
const DIGEST_HEX_LEN: usize = 16;

// == Cache Request ==
/// Identity of a logical request: resource, optional payload and optional
/// isolation scope (tenant, account, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub resource_id: String,
    pub payload: Option<Value>,
    pub isolation: Option<String>,
}

impl CacheRequest {
    /// Creates a request for a resource with no payload.
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            payload: None,
            isolation: None,
        }
    }

    /// Attaches a JSON payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches any serializable payload.
    ///
    /// Fails with `CacheError::Unserializable` when the payload has no JSON
    /// form (for example a map with non-string keys).
    pub fn try_payload<P: Serialize + ?Sized>(self, payload: &P) -> Result<Self> {
        let value = serde_json::to_value(payload)?;
        Ok(self.with_payload(value))
    }

    /// Scopes the request to an isolation context.
    pub fn with_isolation(mut self, context: impl Into<String>) -> Self {
        self.isolation = Some(context.into());
        self
    }

    /// Resource identifier with query string, fragment and trailing slash removed.
    pub fn source_identifier(&self) -> String {
        normalize_resource(&self.resource_id)
    }
}

// == Key Builder ==
/// Pure key derivation with a configurable set of volatile payload fields.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    volatile_fields: BTreeSet<String>,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::with_volatile_fields(DEFAULT_VOLATILE_FIELDS.iter().copied())
    }
}

impl KeyBuilder {
    /// Creates a builder that ignores [`DEFAULT_VOLATILE_FIELDS`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder that ignores exactly the given fields.
    pub fn with_volatile_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            volatile_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    // == Build ==
    /// Builds the key for a request.
    pub fn build(&self, request: &CacheRequest) -> String {
        let mut key = String::new();

        if let Some(context) = request.isolation.as_deref() {
            key.push_str(&context.len().to_string());
            key.push(':');
            key.push_str(context);
        }
        key.push_str("::");

        key.push_str(&normalize_resource(&request.resource_id));

        if let Some(payload) = request.payload.as_ref().filter(|p| !p.is_null()) {
            key.push('#');
            key.push_str(&self.payload_digest(payload));
        }

        key
    }

    // == Payload Digest ==
    /// Hex digest of the canonical form of `payload`.
    pub fn payload_digest(&self, payload: &Value) -> String {
        let canonical = self.canonicalize(payload).to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(DIGEST_HEX_LEN);
        hex
    }

    // == Canonicalize ==
    /// Returns `value` with volatile fields removed, object keys in sorted
    /// order and every array sorted by the canonical text of its elements.
    pub fn canonicalize(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut fields: Vec<(&String, &Value)> = map
                    .iter()
                    .filter(|(name, _)| !self.volatile_fields.contains(name.as_str()))
                    .collect();
                fields.sort_by(|a, b| a.0.cmp(b.0));

                let mut out = Map::new();
                for (name, field) in fields {
                    out.insert(name.clone(), self.canonicalize(field));
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let mut keyed: Vec<(String, Value)> = items
                    .iter()
                    .map(|item| {
                        let canonical = self.canonicalize(item);
                        (canonical.to_string(), canonical)
                    })
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                Value::Array(keyed.into_iter().map(|(_, item)| item).collect())
            }
            other => other.clone(),
        }
    }
}

// == Utility Functions ==
/// Builds a key with the default volatile field set.
pub fn build_key(resource_id: &str, payload: Option<&Value>, isolation: Option<&str>) -> String {
    let request = CacheRequest {
        resource_id: resource_id.to_string(),
        payload: payload.cloned(),
        isolation: isolation.map(str::to_string),
    };
    KeyBuilder::default().build(&request)
}

/// Keeps only the stable path of a resource identifier.
pub fn normalize_resource(resource_id: &str) -> String {
    let end = resource_id.find(['?', '#']).unwrap_or(resource_id.len());
    let path = resource_id[..end].trim();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
