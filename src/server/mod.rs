//! HTTP server bootstrap (§0 crate shape).
//!
//! Grounded on the teacher's `server::mod`: a thin `ServerConfig` that
//! collapses the YAML `config::ServerConfig` (address + port kept apart for
//! deserialization) into a single dialable socket address, plus a struct
//! that owns it. Like the teacher, this verifies the server can be built and
//! configured; wiring the Pingora service loop itself lives in the binary's
//! `main`, following `proxy::mod`'s own scope (its only content there is
//! tests, not a running server either).

use crate::config::Config;

/// Runtime bind configuration for the gateway's HTTP listener.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Combined `host:port` to bind to.
    pub address: String,
    /// Number of worker threads.
    pub threads: usize,
}

impl ServerConfig {
    pub fn new(address: String) -> Self {
        Self { address, threads: 4 }
    }

    /// Build from the loaded application config, combining `server.address`
    /// and `server.port` into one socket address.
    pub fn from_config(config: &Config) -> Self {
        Self {
            address: format!("{}:{}", config.server.address, config.server.port),
            threads: config.server.threads,
        }
    }
}

/// Errors that can occur while constructing the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid bind address '{0}': {1}")]
    InvalidAddress(String, String),
}

/// Owns the resolved server configuration. Construction validates that the
/// configured address actually parses as a socket address; the Pingora
/// service itself is wired up by the binary once this succeeds.
pub struct GatewayServer {
    config: ServerConfig,
}

impl GatewayServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| ServerError::InvalidAddress(config.address.clone(), e.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
