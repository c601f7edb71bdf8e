// Configuration module

pub mod bypass;
pub mod cache;
pub mod circuit_breaker;
pub mod coalescing;
pub mod retry;
pub mod source;

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use bypass::BypassConfig;
pub use cache::{CacheConfig, TtlConfig};
pub use coalescing::{CoalescingConfig, CoalescingStrategy};
pub use source::{SourceCacheOverride, SourceConfig, UpstreamConfig};

use crate::constants::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_HEADER_SIZE,
    DEFAULT_MAX_URI_LENGTH, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_THREADS,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub coalescing: CoalescingConfig,
    #[serde(default)]
    pub bypass: BypassConfig,
    /// Bumped on every successful hot reload (§reload); not read from YAML.
    #[serde(default)]
    pub generation: u64,
}

impl Config {
    /// Load and parse a YAML config file, substituting `${VAR}` env references.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file {}: {}", path.display(), e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        // Now perform the substitution (we know all vars exist)
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap() // Safe because we checked above
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen_prefixes = HashSet::new();

        for source in &self.sources {
            if source.path_prefix.is_empty() {
                return Err(format!("Source '{}' has empty path_prefix", source.name));
            }

            if !seen_prefixes.insert(&source.path_prefix) {
                return Err(format!(
                    "Duplicate path_prefix '{}' found in source '{}'",
                    source.path_prefix, source.name
                ));
            }

            if source.upstream.base_url.is_empty() {
                return Err(format!(
                    "Source '{}' has empty upstream.base_url",
                    source.name
                ));
            }
        }

        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_concurrent_requests() -> usize {
    DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_max_header_size() -> usize {
    DEFAULT_MAX_HEADER_SIZE
}

fn default_max_uri_length() -> usize {
    DEFAULT_MAX_URI_LENGTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub security_limits: SecurityLimitsConfig,
}

/// Request-shape limits applied before recipe parsing ever runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimitsConfig {
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
    #[serde(default = "default_max_uri_length")]
    pub max_uri_length: usize,
}

impl Default for SecurityLimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
            max_header_size: default_max_header_size(),
            max_uri_length: default_max_uri_length(),
        }
    }
}
