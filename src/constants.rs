// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

// =============================================================================
// Server defaults
// =============================================================================

/// Default request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default maximum concurrent requests
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1000;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Upstream / transformer RPC defaults
// =============================================================================

/// Default upstream fetch timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

/// Default connection pool size per upstream source
pub const DEFAULT_CONNECTION_POOL_SIZE: usize = 50;

// =============================================================================
// Security defaults
// =============================================================================

/// Default maximum request body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum header size (64 KB)
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// Default maximum URI length (8 KB)
pub const DEFAULT_MAX_URI_LENGTH: usize = 8192;

// =============================================================================
// Recipe limits (§3 TransformRecipe invariants)
// =============================================================================

pub const RECIPE_MIN_DIMENSION: u32 = 10;
pub const RECIPE_MAX_DIMENSION: u32 = 2000;
pub const RECIPE_MIN_TIME_SECS: u32 = 0;
pub const RECIPE_MAX_TIME_SECS: u32 = 600;
pub const RECIPE_MIN_DURATION_SECS: u32 = 1;
pub const RECIPE_MAX_DURATION_SECS: u32 = 300;
pub const RECIPE_MAX_CUSTOM_DATA_PAIRS: usize = 16;
pub const RECIPE_MAX_CUSTOM_DATA_LEN: usize = 128;

// =============================================================================
// Fingerprint / cache key
// =============================================================================

/// Hard cap on fingerprint length before it is truncated and suffixed
pub const FINGERPRINT_MAX_BYTES: usize = 512;

/// Hex characters of the collision-avoidance suffix appended after truncation
pub const FINGERPRINT_SUFFIX_HEX_LEN: usize = 8;

// =============================================================================
// Chunked object store defaults
// =============================================================================

/// Values exceeding this size are split into chunks; a value of exactly this
/// size is still stored whole (§3: "When the body exceeds `ChunkThreshold`")
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Size of each chunk when an object is split (the per-object override lives
/// in the manifest; this is only the default used to compute one)
pub const DEFAULT_STANDARD_CHUNK_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Upper bound on chunk count for a single object
pub const DEFAULT_MAX_CHUNKS: u32 = 1000;

/// Maximum time a chunk write lock may be held before the sweeper reclaims it
pub const CHUNK_LOCK_MAX_HOLD_SECS: u64 = 30;

/// How often the chunk-lock sweeper scans for expired locks
pub const CHUNK_LOCK_SWEEP_INTERVAL_SECS: u64 = 5;

/// Per-chunk read timeout
pub const CHUNK_READ_TIMEOUT_SECS: u64 = 10;

/// Maximum number of chunk writes allowed to run concurrently for one object
pub const DEFAULT_PARALLEL_CHUNK_WRITE_LIMIT: usize = 5;

/// Accepted length drift on chunk read: max(this, fraction of expected)
pub const CHUNK_INTEGRITY_MIN_DRIFT_BYTES: u64 = 2 * 1024;

/// Fractional drift tolerance applied to the expected chunk length
pub const CHUNK_INTEGRITY_DRIFT_FRACTION: f64 = 0.001;

// =============================================================================
// Fallback streamer defaults
// =============================================================================

/// Responses larger than this are served straight through with no persistence
pub const DEFAULT_HARD_SKIP_THRESHOLD_BYTES: u64 = 128 * 1024 * 1024;

/// Bounded channel capacity for the origin-to-{client,store} tee pump
pub const FALLBACK_PUMP_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// TTL classes (seconds), by response status family
// =============================================================================

pub const TTL_SUCCESS_SECS: u64 = 24 * 3600;
pub const TTL_REDIRECT_SECS: u64 = 3600;
pub const TTL_CLIENT_ERROR_SECS: u64 = 60;
pub const TTL_SERVER_ERROR_SECS: u64 = 10;

// =============================================================================
// Circuit breaker defaults
// =============================================================================

/// Default number of failures before circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default number of successes to close circuit
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Default circuit breaker timeout in seconds
pub const DEFAULT_CB_TIMEOUT_SECS: u64 = 60;

/// Default maximum requests allowed in half-open state
pub const DEFAULT_HALF_OPEN_MAX_REQUESTS: u32 = 3;

// =============================================================================
// Retry defaults
// =============================================================================

/// Default maximum retry attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default initial backoff in milliseconds
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default maximum backoff in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1000;
