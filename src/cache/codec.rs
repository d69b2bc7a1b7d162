//! Compression Codec Module
//!
//! Reversible byte-level compression for large cached values.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Compression Codec ==
/// Reversible value codec: `decompress(compress(v)) == v`.
pub trait CompressionCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn compress(&self, value: &Value) -> Result<Vec<u8>>;

    fn decompress(&self, bytes: &[u8]) -> Result<Value>;
}

// == Gzip Codec ==
/// Gzip over the compact JSON text of the value.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCodec {
    /// Creates a codec with an explicit level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl CompressionCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, value: &Value) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(value)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder
            .write_all(&raw)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Compression(e.to_string()))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Value> {
        let mut raw = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| CacheError::Compression(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| CacheError::Compression(e.to_string()))
    }
}
