//! Wire types for the chunked object store (§4.C, §3 "Stored Value").
//!
//! Serialized with `rmp-serde`, the same msgpack wire format the teacher's
//! `cache::redis::serialization` uses for `CacheEntry`, versioned the same
//! way so the schema can evolve without breaking already-stored objects.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

const SERIALIZATION_VERSION: u8 = 1;

/// Metadata recorded alongside every stored object, chunked or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: String,
    pub content_length: u64,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub cache_tags: Vec<String>,
    pub cache_version: u32,
    /// Echo of the recipe that produced this object, kept for diagnostics.
    pub recipe_echo: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms > 0 && now_ms >= self.expires_at_ms
    }
}

/// Written once all chunks have landed; absence of a manifest for a
/// chunked key means the write never completed (§8 property: cleanup on
/// partial write).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub total_size: u64,
    pub chunk_count: u32,
    pub standard_chunk_size: u64,
    pub actual_chunk_sizes: Vec<u64>,
    pub original_content_type: String,
    pub is_chunked: bool,
}

impl Manifest {
    pub fn new(total_size: u64, standard_chunk_size: u64, actual_chunk_sizes: Vec<u64>, content_type: String) -> Self {
        Self {
            total_size,
            chunk_count: actual_chunk_sizes.len() as u32,
            standard_chunk_size,
            actual_chunk_sizes,
            original_content_type: content_type,
            is_chunked: true,
        }
    }

    /// Offset (exclusive end) of chunk `index` within the logical object.
    pub fn chunk_end_offset(&self, index: usize) -> u64 {
        self.actual_chunk_sizes[..=index].iter().sum()
    }

    /// Offset (inclusive start) of chunk `index`.
    pub fn chunk_start_offset(&self, index: usize) -> u64 {
        self.actual_chunk_sizes[..index].iter().sum()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireManifest {
    version: u8,
    manifest: Manifest,
    metadata: ObjectMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireSingle {
    version: u8,
    data: Vec<u8>,
    metadata: ObjectMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("manifest/object serialization failed: {0}")]
    Encode(String),
    #[error("manifest/object deserialization failed: {0}")]
    Decode(String),
    #[error("unsupported schema version {found} (expected {expected})")]
    Version { found: u8, expected: u8 },
}

pub fn encode_single(data: &Bytes, metadata: &ObjectMetadata) -> Result<Vec<u8>, WireError> {
    let wire = WireSingle {
        version: SERIALIZATION_VERSION,
        data: data.to_vec(),
        metadata: metadata.clone(),
    };
    rmp_serde::to_vec(&wire).map_err(|e| WireError::Encode(e.to_string()))
}

pub fn decode_single(bytes: &[u8]) -> Result<(Bytes, ObjectMetadata), WireError> {
    let wire: WireSingle = rmp_serde::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))?;
    if wire.version != SERIALIZATION_VERSION {
        return Err(WireError::Version {
            found: wire.version,
            expected: SERIALIZATION_VERSION,
        });
    }
    Ok((Bytes::from(wire.data), wire.metadata))
}

pub fn encode_manifest(manifest: &Manifest, metadata: &ObjectMetadata) -> Result<Vec<u8>, WireError> {
    let wire = WireManifest {
        version: SERIALIZATION_VERSION,
        manifest: manifest.clone(),
        metadata: metadata.clone(),
    };
    rmp_serde::to_vec(&wire).map_err(|e| WireError::Encode(e.to_string()))
}

pub fn decode_manifest(bytes: &[u8]) -> Result<(Manifest, ObjectMetadata), WireError> {
    let wire: WireManifest = rmp_serde::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))?;
    if wire.version != SERIALIZATION_VERSION {
        return Err(WireError::Version {
            found: wire.version,
            expected: SERIALIZATION_VERSION,
        });
    }
    Ok((wire.manifest, wire.metadata))
}
