//! Retry Logic with Exponential Backoff
//!
//! Handles transient failures from the upstream transformer and from
//! background chunk-persistence writes by retrying with exponential backoff.
//!
//! ## Retriable vs Non-Retriable Errors
//!
//! **Retriable Errors** (will be retried):
//! - 500 Internal Server Error - Temporary transformer issue
//! - 502 Bad Gateway - Upstream connection issue
//! - 503 Service Unavailable - Transformer temporarily overloaded
//! - 504 Gateway Timeout - Transformer request timed out
//!
//! **Non-Retriable Errors** (fail immediately):
//! - 400 Bad Request - Invalid request format
//! - 403 Forbidden - Permission denied
//! - 404 Not Found - Object doesn't exist
//! - 416 Range Not Satisfiable - Invalid range
//! - 2xx Success - Request succeeded
//!
//! ## Exponential Backoff
//!
//! Delays between retries grow exponentially to avoid overwhelming the backend:
//! - Attempt 1: No delay (immediate)
//! - Attempt 2: 100ms delay
//! - Attempt 3: 200ms delay (2x)
//! - Attempt 4: 400ms delay (2x)
//! - Capped at max_backoff_ms to prevent excessive delays
//!
//! ## Configuration Example
//!
//! ```yaml
//! sources:
//!   - name: videos
//!     upstream:
//!       retry:
//!         max_attempts: 3
//!         initial_backoff_ms: 100
//!         max_backoff_ms: 1000
//! ```

use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (including initial attempt)
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds (cap for exponential growth)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Check if an HTTP status code should be retried
    pub fn is_retriable_status(&self, status_code: u16) -> bool {
        matches!(status_code, 500 | 502 | 503 | 504)
    }

    /// Calculate backoff delay for a given attempt number (0-indexed)
    ///
    /// # Arguments
    /// * `attempt` - The attempt number (0 = first attempt, 1 = first retry, etc.)
    ///
    /// # Returns
    /// Duration to wait before the next attempt (0 for first attempt)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            // First attempt: no delay
            return Duration::from_millis(0);
        }

        // Exponential backoff: initial_backoff * 2^(attempt-1)
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt - 1))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    /// Check if we should retry given the current attempt number and status code
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (0-indexed)
    /// * `status_code` - HTTP status code from the response
    ///
    /// # Returns
    /// true if we should retry, false otherwise
    pub fn should_retry(&self, attempt: u32, status_code: u16) -> bool {
        // Don't retry if we've exhausted attempts
        if attempt >= self.max_attempts - 1 {
            return false;
        }

        // Only retry if the status code is retriable
        self.is_retriable_status(status_code)
    }
}
