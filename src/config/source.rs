//! Source configuration types.
//!
//! A "source" maps a request path prefix to an upstream transformer
//! endpoint, mirroring the teacher's per-bucket routing table but without
//! any S3/auth/authorization concerns (those are explicit Non-goals here).
//!
//! Default values for timeouts and pool sizes are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONNECTION_POOL_SIZE, DEFAULT_UPSTREAM_TIMEOUT_SECS};

use super::circuit_breaker::CircuitBreakerConfigYaml;
use super::retry::RetryConfigYaml;

fn default_upstream_timeout() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_connection_pool_size() -> usize {
    DEFAULT_CONNECTION_POOL_SIZE
}

/// One routable source: a path prefix and the transformer endpoint behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub path_prefix: String,
    pub upstream: UpstreamConfig,
    /// Per-source TTL override; falls back to the global TTL classes when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<SourceCacheOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the transformer RPC endpoint for this source.
    pub base_url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connection_pool_size")]
    pub connection_pool_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfigYaml>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfigYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCacheOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}
