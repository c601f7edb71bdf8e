// Error types module

use std::fmt;

/// Centralized error type for the gateway.
///
/// Categorizes errors so the orchestrator can map them to the right HTTP
/// status and TTL class without every caller re-deriving that mapping.
#[derive(Debug, Clone)]
pub enum ProxyError {
    /// Malformed request: bad recipe params, unparsable Range header, etc.
    BadRequest(String),

    /// The upstream transformer returned an error status or was unreachable.
    UpstreamError(String),

    /// The upstream source exceeds what the transformer is willing to
    /// process, or the transformer explicitly rejected the recipe.
    SourceTooLarge,
    TransformerRejected(String),

    /// Requested key has no cached value (not itself a failure condition,
    /// but surfaced so callers can distinguish it from a storage error).
    CacheMiss,

    /// Durable or edge tier failed to read/write (degrades silently to
    /// fetch-and-serve at the orchestrator level per §7).
    StorageError(String),

    /// Stored object failed its integrity check on read (triggers
    /// bump+miss at the orchestrator level).
    IntegrityError(String),

    /// An operation exceeded its deadline (chunk read, transformer RPC).
    Timeout,

    /// The client went away mid-response; background work may continue.
    ClientDisconnected,

    /// Configuration errors (invalid YAML, missing env vars, etc.)
    Config(String),

    /// Internal errors (unexpected invariant violation, resource exhaustion)
    Internal(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            ProxyError::UpstreamError(msg) => write!(f, "upstream error: {}", msg),
            ProxyError::SourceTooLarge => write!(f, "source too large for transformer"),
            ProxyError::TransformerRejected(msg) => write!(f, "transformer rejected: {}", msg),
            ProxyError::CacheMiss => write!(f, "cache miss"),
            ProxyError::StorageError(msg) => write!(f, "storage error: {}", msg),
            ProxyError::IntegrityError(msg) => write!(f, "integrity error: {}", msg),
            ProxyError::Timeout => write!(f, "operation timed out"),
            ProxyError::ClientDisconnected => write!(f, "client disconnected"),
            ProxyError::Config(msg) => write!(f, "configuration error: {}", msg),
            ProxyError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}

impl ProxyError {
    /// Whether this error should degrade silently to fetch-and-serve rather
    /// than propagate to the client (§7 failure semantics).
    pub fn degrades_silently(&self) -> bool {
        matches!(
            self,
            ProxyError::StorageError(_) | ProxyError::CacheMiss | ProxyError::Timeout
        )
    }

    /// Whether this error should trigger a version bump + forced miss rather
    /// than a silent degrade (§7: integrity failures must not keep serving
    /// the corrupt value).
    pub fn triggers_bump(&self) -> bool {
        matches!(self, ProxyError::IntegrityError(_))
    }
}
