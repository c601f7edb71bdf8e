//! Chunked object store and edge-cache configuration.
//!
//! Thresholds default from `crate::constants`; every default here can be
//! overridden per deployment, but the manifest always records the effective
//! `standard_chunk_size` used for a given object (§9 open question: chunk
//! size is an object-level, not a process-level, constant once written).

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHUNK_THRESHOLD_BYTES, DEFAULT_HARD_SKIP_THRESHOLD_BYTES, DEFAULT_MAX_CHUNKS,
    DEFAULT_PARALLEL_CHUNK_WRITE_LIMIT, DEFAULT_STANDARD_CHUNK_SIZE_BYTES,
};

fn default_chunk_threshold() -> u64 {
    DEFAULT_CHUNK_THRESHOLD_BYTES
}

fn default_standard_chunk_size() -> u64 {
    DEFAULT_STANDARD_CHUNK_SIZE_BYTES
}

fn default_max_chunks() -> u32 {
    DEFAULT_MAX_CHUNKS
}

fn default_parallel_chunk_writes() -> usize {
    DEFAULT_PARALLEL_CHUNK_WRITE_LIMIT
}

fn default_hard_skip_threshold() -> u64 {
    DEFAULT_HARD_SKIP_THRESHOLD_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold_bytes: u64,
    #[serde(default = "default_standard_chunk_size")]
    pub standard_chunk_size_bytes: u64,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
    #[serde(default = "default_parallel_chunk_writes")]
    pub parallel_chunk_writes: usize,
    #[serde(default = "default_hard_skip_threshold")]
    pub fallback_hard_skip_threshold_bytes: u64,
    #[serde(default)]
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_bytes: default_chunk_threshold(),
            standard_chunk_size_bytes: default_standard_chunk_size(),
            max_chunks: default_max_chunks(),
            parallel_chunk_writes: default_parallel_chunk_writes(),
            fallback_hard_skip_threshold_bytes: default_hard_skip_threshold(),
            ttl: TtlConfig::default(),
        }
    }
}

/// TTL-by-status-class defaults (§3 Lifecycle); concrete numbers per SPEC_FULL §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "TtlConfig::default_success_secs")]
    pub success_secs: u64,
    #[serde(default = "TtlConfig::default_redirect_secs")]
    pub redirect_secs: u64,
    #[serde(default = "TtlConfig::default_client_error_secs")]
    pub client_error_secs: u64,
    #[serde(default = "TtlConfig::default_server_error_secs")]
    pub server_error_secs: u64,
}

impl TtlConfig {
    fn default_success_secs() -> u64 {
        crate::constants::TTL_SUCCESS_SECS
    }
    fn default_redirect_secs() -> u64 {
        crate::constants::TTL_REDIRECT_SECS
    }
    fn default_client_error_secs() -> u64 {
        crate::constants::TTL_CLIENT_ERROR_SECS
    }
    fn default_server_error_secs() -> u64 {
        crate::constants::TTL_SERVER_ERROR_SECS
    }

    /// Pick the TTL class for a response status code.
    pub fn for_status(&self, status: u16) -> std::time::Duration {
        let secs = match status {
            200..=299 => self.success_secs,
            300..=399 => self.redirect_secs,
            400..=499 => self.client_error_secs,
            _ => self.server_error_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            success_secs: Self::default_success_secs(),
            redirect_secs: Self::default_redirect_secs(),
            client_error_secs: Self::default_client_error_secs(),
            server_error_secs: Self::default_server_error_secs(),
        }
    }
}
