// Metrics module - Prometheus-compatible metrics tracking
// Provides counters, histograms, and gauges for observability

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Histogram represents percentile statistics for latency measurements
#[derive(Debug, Clone, Copy)]
pub struct Histogram {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metrics struct tracks counters and histograms for Prometheus export
/// Thread-safe via atomic operations and mutexes
pub struct Metrics {
    // Request counters
    request_count: AtomicU64,

    // Status code counters (e.g., 200, 404, 500)
    status_counts: Mutex<HashMap<u16, u64>>,

    // Per-source request counters
    source_counts: Mutex<HashMap<String, u64>>,

    // HTTP method counters (GET, HEAD, POST, etc.)
    method_counts: Mutex<HashMap<String, u64>>,

    // Duration tracking (stored in microseconds as u64)
    durations: Mutex<Vec<u64>>,

    // Upstream transformer latency tracking (stored in microseconds as u64)
    upstream_latencies: Mutex<Vec<u64>>,

    // Per-source latency tracking (stored in microseconds as u64)
    source_latencies: Mutex<HashMap<String, Vec<u64>>>,

    // Cache outcome counters: hit, miss, bypass, version bump
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_bypasses: AtomicU64,
    cache_version_bumps: AtomicU64,

    // Cache bypasses by trigger (query_param, header, debug)
    bypass_reasons: Mutex<HashMap<String, u64>>,

    // Chunked object store metrics
    chunks_written: AtomicU64,
    chunks_read: AtomicU64,
    chunk_integrity_failures: AtomicU64,
    objects_chunked: AtomicU64,

    // Coalescing metrics
    coalescing_leader_count: AtomicU64,
    coalescing_follower_count: AtomicU64,

    // Fallback streaming metrics
    fallback_invocations: AtomicU64,
    fallback_hard_skips: AtomicU64,
    fallback_persist_failures: AtomicU64,

    // Upstream operation counters (GET, HEAD, etc.)
    upstream_operations: Mutex<HashMap<String, u64>>,

    // System metrics
    active_connections: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    memory_usage: AtomicU64,
    uptime_seconds: AtomicU64,

    // Upstream error counters by error class (timeout, connect, 5xx, ...)
    upstream_errors: Mutex<HashMap<String, u64>>,

    // Configuration reload metrics
    reload_success: AtomicU64,
    reload_failure: AtomicU64,
    config_generation: AtomicU64,

    // Concurrency limiting metrics
    concurrency_limit_rejections: AtomicU64,

    // Retry metrics (per-source)
    retry_attempts: Mutex<HashMap<String, u64>>,
    retry_success: Mutex<HashMap<String, u64>>,
    retry_exhausted: Mutex<HashMap<String, u64>>,

    // Security validation metrics
    security_payload_too_large: AtomicU64,
    security_headers_too_large: AtomicU64,
    security_uri_too_long: AtomicU64,

    // Backend health per source (1=healthy, 0=unhealthy)
    backend_health: Mutex<HashMap<String, bool>>,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Metrics {
            request_count: AtomicU64::new(0),
            status_counts: Mutex::new(HashMap::new()),
            source_counts: Mutex::new(HashMap::new()),
            method_counts: Mutex::new(HashMap::new()),
            durations: Mutex::new(Vec::new()),
            upstream_latencies: Mutex::new(Vec::new()),
            source_latencies: Mutex::new(HashMap::new()),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_bypasses: AtomicU64::new(0),
            cache_version_bumps: AtomicU64::new(0),
            bypass_reasons: Mutex::new(HashMap::new()),
            chunks_written: AtomicU64::new(0),
            chunks_read: AtomicU64::new(0),
            chunk_integrity_failures: AtomicU64::new(0),
            objects_chunked: AtomicU64::new(0),
            coalescing_leader_count: AtomicU64::new(0),
            coalescing_follower_count: AtomicU64::new(0),
            fallback_invocations: AtomicU64::new(0),
            fallback_hard_skips: AtomicU64::new(0),
            fallback_persist_failures: AtomicU64::new(0),
            upstream_operations: Mutex::new(HashMap::new()),
            active_connections: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            memory_usage: AtomicU64::new(0),
            uptime_seconds: AtomicU64::new(0),
            upstream_errors: Mutex::new(HashMap::new()),
            reload_success: AtomicU64::new(0),
            reload_failure: AtomicU64::new(0),
            config_generation: AtomicU64::new(0),
            concurrency_limit_rejections: AtomicU64::new(0),
            retry_attempts: Mutex::new(HashMap::new()),
            retry_success: Mutex::new(HashMap::new()),
            retry_exhausted: Mutex::new(HashMap::new()),
            security_payload_too_large: AtomicU64::new(0),
            security_headers_too_large: AtomicU64::new(0),
            security_uri_too_long: AtomicU64::new(0),
            backend_health: Mutex::new(HashMap::new()),
        }
    }

    /// Check if metrics struct is valid (for testing)
    pub fn is_valid(&self) -> bool {
        true
    }

    /// Increment the total request count
    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter for a specific HTTP status code
    pub fn increment_status_count(&self, status_code: u16) {
        if let Ok(mut counts) = self.status_counts.lock() {
            *counts.entry(status_code).or_insert(0) += 1;
        }
    }

    /// Increment counter for a specific source name
    pub fn increment_source_count(&self, source_name: &str) {
        if let Ok(mut counts) = self.source_counts.lock() {
            *counts.entry(source_name.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment counter for a specific HTTP method
    pub fn increment_method_count(&self, method: &str) {
        if let Ok(mut counts) = self.method_counts.lock() {
            *counts.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a request duration in milliseconds
    pub fn record_duration(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut durations) = self.durations.lock() {
            durations.push(duration_us);
        }
    }

    /// Get current request count (for testing)
    #[cfg(test)]
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Get count for specific status code (for testing)
    #[cfg(test)]
    pub fn get_status_count(&self, status_code: u16) -> u64 {
        self.status_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(&status_code).copied())
            .unwrap_or(0)
    }

    /// Get count for specific source (for testing)
    #[cfg(test)]
    pub fn get_source_count(&self, source_name: &str) -> u64 {
        self.source_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(source_name).copied())
            .unwrap_or(0)
    }

    /// Get count for specific HTTP method (for testing)
    #[cfg(test)]
    pub fn get_method_count(&self, method: &str) -> u64 {
        self.method_counts
            .lock()
            .ok()
            .and_then(|counts| counts.get(method).copied())
            .unwrap_or(0)
    }

    /// Record upstream transformer latency in milliseconds
    pub fn record_upstream_latency(&self, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut latencies) = self.upstream_latencies.lock() {
            latencies.push(duration_us);
        }
    }

    /// Record latency for a specific source in milliseconds
    pub fn record_source_latency(&self, source_name: &str, duration_ms: f64) {
        let duration_us = (duration_ms * 1000.0) as u64;
        if let Ok(mut latencies) = self.source_latencies.lock() {
            latencies
                .entry(source_name.to_string())
                .or_insert_with(Vec::new)
                .push(duration_us);
        }
    }

    /// Calculate histogram from duration samples
    pub fn get_duration_histogram(&self) -> Histogram {
        if let Ok(durations) = self.durations.lock() {
            calculate_histogram(&durations)
        } else {
            empty_histogram()
        }
    }

    /// Calculate histogram from upstream latency samples (for testing)
    #[cfg(test)]
    pub fn get_upstream_latency_histogram(&self) -> Histogram {
        if let Ok(latencies) = self.upstream_latencies.lock() {
            calculate_histogram(&latencies)
        } else {
            empty_histogram()
        }
    }

    /// Calculate histogram for specific source (for testing)
    #[cfg(test)]
    pub fn get_source_latency_histogram(&self, source_name: &str) -> Histogram {
        if let Ok(latencies) = self.source_latencies.lock() {
            if let Some(source_samples) = latencies.get(source_name) {
                calculate_histogram(source_samples)
            } else {
                empty_histogram()
            }
        } else {
            empty_histogram()
        }
    }

    /// Increment cache hit counter (served from edge or durable tier without upstream fetch)
    pub fn increment_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment cache miss counter (upstream fetch required)
    pub fn increment_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment cache bypass counter (debug/nocache/no-kv-cache/header bypass)
    pub fn increment_cache_bypass(&self, reason: &str) {
        self.cache_bypasses.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut reasons) = self.bypass_reasons.lock() {
            *reasons.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment version-bump counter (integrity failure triggered a cache-key bust)
    pub fn increment_cache_version_bump(&self) {
        self.cache_version_bumps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get cache hit count (for testing)
    #[cfg(test)]
    pub fn get_cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Get cache miss count (for testing)
    #[cfg(test)]
    pub fn get_cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Get cache bypass count (for testing)
    #[cfg(test)]
    pub fn get_cache_bypasses(&self) -> u64 {
        self.cache_bypasses.load(Ordering::Relaxed)
    }

    /// Get bypass count for a specific reason (for testing)
    #[cfg(test)]
    pub fn get_bypass_reason_count(&self, reason: &str) -> u64 {
        self.bypass_reasons
            .lock()
            .ok()
            .and_then(|reasons| reasons.get(reason).copied())
            .unwrap_or(0)
    }

    /// Cache hit ratio as hits / (hits + misses), 0.0 when no samples yet
    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed) as f64;
        let misses = self.cache_misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }

    /// Increment chunks-written counter (object store persist)
    pub fn increment_chunks_written(&self, count: u64) {
        self.chunks_written.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment chunks-read counter (object store fetch)
    pub fn increment_chunks_read(&self, count: u64) {
        self.chunks_read.fetch_add(count, Ordering::Relaxed);
    }

    /// Increment chunk integrity failure counter (size/hash mismatch on read)
    pub fn increment_chunk_integrity_failure(&self) {
        self.chunk_integrity_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter for objects large enough to require chunking
    pub fn increment_objects_chunked(&self) {
        self.objects_chunked.fetch_add(1, Ordering::Relaxed);
    }

    /// Get chunks written count (for testing)
    #[cfg(test)]
    pub fn get_chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::Relaxed)
    }

    /// Get chunk integrity failure count (for testing)
    #[cfg(test)]
    pub fn get_chunk_integrity_failures(&self) -> u64 {
        self.chunk_integrity_failures.load(Ordering::Relaxed)
    }

    /// Increment counter for a request that became the coalescing leader (fetched upstream)
    pub fn increment_coalescing_leader(&self) {
        self.coalescing_leader_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter for a request that joined an in-flight fetch as a follower
    pub fn increment_coalescing_follower(&self) {
        self.coalescing_follower_count
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Coalescing dedup ratio: followers / (leaders + followers). 0.0 when no samples yet.
    pub fn coalescing_dedup_ratio(&self) -> f64 {
        let leaders = self.coalescing_leader_count.load(Ordering::Relaxed) as f64;
        let followers = self.coalescing_follower_count.load(Ordering::Relaxed) as f64;
        if leaders + followers == 0.0 {
            0.0
        } else {
            followers / (leaders + followers)
        }
    }

    /// Get coalescing leader count (for testing)
    #[cfg(test)]
    pub fn get_coalescing_leader_count(&self) -> u64 {
        self.coalescing_leader_count.load(Ordering::Relaxed)
    }

    /// Get coalescing follower count (for testing)
    #[cfg(test)]
    pub fn get_coalescing_follower_count(&self) -> u64 {
        self.coalescing_follower_count.load(Ordering::Relaxed)
    }

    /// Increment fallback streaming invocation counter (cache write path failed or skipped)
    pub fn increment_fallback_invocation(&self) {
        self.fallback_invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment hard-skip counter (object exceeded the size threshold for caching)
    pub fn increment_fallback_hard_skip(&self) {
        self.fallback_hard_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment background persistence failure counter (tee succeeded, store write failed)
    pub fn increment_fallback_persist_failure(&self) {
        self.fallback_persist_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get fallback invocation count (for testing)
    #[cfg(test)]
    pub fn get_fallback_invocations(&self) -> u64 {
        self.fallback_invocations.load(Ordering::Relaxed)
    }

    /// Increment counter for a specific upstream operation
    pub fn increment_upstream_operation(&self, operation: &str) {
        if let Ok(mut operations) = self.upstream_operations.lock() {
            *operations.entry(operation.to_string()).or_insert(0) += 1;
        }
    }

    /// Increment counter for a specific upstream error class
    pub fn increment_upstream_error(&self, error_class: &str) {
        if let Ok(mut errors) = self.upstream_errors.lock() {
            *errors.entry(error_class.to_string()).or_insert(0) += 1;
        }
    }

    /// Get count for specific upstream operation (for testing)
    #[cfg(test)]
    pub fn get_upstream_operation_count(&self, operation: &str) -> u64 {
        self.upstream_operations
            .lock()
            .ok()
            .and_then(|operations| operations.get(operation).copied())
            .unwrap_or(0)
    }

    /// Get count for specific upstream error class (for testing)
    #[cfg(test)]
    pub fn get_upstream_error_count(&self, error_class: &str) -> u64 {
        self.upstream_errors
            .lock()
            .ok()
            .and_then(|errors| errors.get(error_class).copied())
            .unwrap_or(0)
    }

    // System metrics methods

    /// Increment active connections count (new client connected)
    pub fn increment_active_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections count (client disconnected)
    pub fn decrement_active_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Add bytes sent to client
    pub fn add_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes received from client
    pub fn add_bytes_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Update memory usage (RSS in bytes)
    pub fn update_memory_usage(&self, bytes: u64) {
        self.memory_usage.store(bytes, Ordering::Relaxed);
    }

    /// Update uptime (seconds since start)
    pub fn update_uptime(&self, seconds: u64) {
        self.uptime_seconds.store(seconds, Ordering::Relaxed);
    }

    /// Get active connections count (for testing)
    #[cfg(test)]
    pub fn get_active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get bytes sent (for testing)
    #[cfg(test)]
    pub fn get_bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Get bytes received (for testing)
    #[cfg(test)]
    pub fn get_bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Get memory usage (for testing)
    #[cfg(test)]
    pub fn get_memory_usage(&self) -> u64 {
        self.memory_usage.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds (for testing)
    #[cfg(test)]
    pub fn get_uptime_seconds(&self) -> u64 {
        self.uptime_seconds.load(Ordering::Relaxed)
    }

    // Configuration reload metrics methods

    /// Increment successful config reload counter
    pub fn increment_reload_success(&self) {
        self.reload_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed config reload counter
    pub fn increment_reload_failure(&self) {
        self.reload_failure.fetch_add(1, Ordering::Relaxed);
    }

    /// Set current config generation number
    pub fn set_config_generation(&self, generation: u64) {
        self.config_generation.store(generation, Ordering::Relaxed);
    }

    /// Increment concurrency limit rejection counter (503 responses)
    pub fn increment_concurrency_limit_rejection(&self) {
        self.concurrency_limit_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment retry attempt counter for a specific source
    pub fn increment_retry_attempt(&self, source: &str) {
        let mut retry_attempts = self.retry_attempts.lock().unwrap();
        *retry_attempts.entry(source.to_string()).or_insert(0) += 1;
    }

    /// Increment retry success counter for a specific source (eventually succeeded after retry)
    pub fn increment_retry_success(&self, source: &str) {
        let mut retry_success = self.retry_success.lock().unwrap();
        *retry_success.entry(source.to_string()).or_insert(0) += 1;
    }

    /// Increment retry exhausted counter for a specific source (all attempts failed)
    pub fn increment_retry_exhausted(&self, source: &str) {
        let mut retry_exhausted = self.retry_exhausted.lock().unwrap();
        *retry_exhausted.entry(source.to_string()).or_insert(0) += 1;
    }

    /// Increment security validation: payload too large (413 responses)
    pub fn increment_security_payload_too_large(&self) {
        self.security_payload_too_large
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment security validation: headers too large (431 responses)
    pub fn increment_security_headers_too_large(&self) {
        self.security_headers_too_large
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment security validation: URI too long (414 responses)
    pub fn increment_security_uri_too_long(&self) {
        self.security_uri_too_long.fetch_add(1, Ordering::Relaxed);
    }

    /// Set backend health status for a source (1=healthy, 0=unhealthy)
    pub fn set_backend_health(&self, source_name: &str, is_healthy: bool) {
        if let Ok(mut health) = self.backend_health.lock() {
            health.insert(source_name.to_string(), is_healthy);
        }
    }

    /// Get backend health status for all sources
    pub fn get_backend_health(&self) -> HashMap<String, bool> {
        if let Ok(health) = self.backend_health.lock() {
            health.clone()
        } else {
            HashMap::new()
        }
    }

    /// Get successful reload count (for testing)
    #[cfg(test)]
    pub fn get_reload_success_count(&self) -> u64 {
        self.reload_success.load(Ordering::Relaxed)
    }

    /// Get failed reload count (for testing)
    #[cfg(test)]
    pub fn get_reload_failure_count(&self) -> u64 {
        self.reload_failure.load(Ordering::Relaxed)
    }

    /// Get current config generation (for testing)
    #[cfg(test)]
    pub fn get_config_generation(&self) -> u64 {
        self.config_generation.load(Ordering::Relaxed)
    }

    /// Get concurrency limit rejection count (for testing)
    #[cfg(test)]
    pub fn get_concurrency_limit_rejections(&self) -> u64 {
        self.concurrency_limit_rejections.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format
    /// Returns metrics as text/plain content for /metrics endpoint
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP http_requests_total Total number of HTTP requests received\n");
        output.push_str("# TYPE http_requests_total counter\n");
        output.push_str(&format!(
            "http_requests_total {}\n",
            self.request_count.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP http_requests_by_status_total HTTP requests by status code\n");
        output.push_str("# TYPE http_requests_by_status_total counter\n");
        if let Ok(counts) = self.status_counts.lock() {
            for (status, count) in counts.iter() {
                output.push_str(&format!(
                    "http_requests_by_status_total{{status=\"{}\"}} {}\n",
                    status, count
                ));
            }
        }

        output.push_str("\n# HELP http_requests_by_source_total HTTP requests by configured source\n");
        output.push_str("# TYPE http_requests_by_source_total counter\n");
        if let Ok(counts) = self.source_counts.lock() {
            for (source, count) in counts.iter() {
                output.push_str(&format!(
                    "http_requests_by_source_total{{source=\"{}\"}} {}\n",
                    source, count
                ));
            }
        }

        output.push_str("\n# HELP http_requests_by_method_total HTTP requests by method\n");
        output.push_str("# TYPE http_requests_by_method_total counter\n");
        if let Ok(counts) = self.method_counts.lock() {
            for (method, count) in counts.iter() {
                output.push_str(&format!(
                    "http_requests_by_method_total{{method=\"{}\"}} {}\n",
                    method, count
                ));
            }
        }

        // Cache metrics
        output.push_str("\n# HELP cache_hits_total Requests served from the cache without an upstream fetch\n");
        output.push_str("# TYPE cache_hits_total counter\n");
        output.push_str(&format!(
            "cache_hits_total {}\n",
            self.cache_hits.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP cache_misses_total Requests that required an upstream fetch\n");
        output.push_str("# TYPE cache_misses_total counter\n");
        output.push_str(&format!(
            "cache_misses_total {}\n",
            self.cache_misses.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP cache_bypasses_total Requests that explicitly bypassed the cache\n");
        output.push_str("# TYPE cache_bypasses_total counter\n");
        output.push_str(&format!(
            "cache_bypasses_total {}\n",
            self.cache_bypasses.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP cache_bypasses_by_reason_total Cache bypasses broken down by trigger\n");
        output.push_str("# TYPE cache_bypasses_by_reason_total counter\n");
        if let Ok(reasons) = self.bypass_reasons.lock() {
            for (reason, count) in reasons.iter() {
                output.push_str(&format!(
                    "cache_bypasses_by_reason_total{{reason=\"{}\"}} {}\n",
                    reason, count
                ));
            }
        }

        output.push_str("\n# HELP cache_version_bumps_total Cache-key version bumps triggered by integrity failures\n");
        output.push_str("# TYPE cache_version_bumps_total counter\n");
        output.push_str(&format!(
            "cache_version_bumps_total {}\n",
            self.cache_version_bumps.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP cache_hit_ratio Fraction of requests served without an upstream fetch\n");
        output.push_str("# TYPE cache_hit_ratio gauge\n");
        output.push_str(&format!("cache_hit_ratio {:.4}\n", self.cache_hit_ratio()));

        // Chunked object store metrics
        output.push_str("\n# HELP object_store_chunks_written_total Chunks written to the object store\n");
        output.push_str("# TYPE object_store_chunks_written_total counter\n");
        output.push_str(&format!(
            "object_store_chunks_written_total {}\n",
            self.chunks_written.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP object_store_chunks_read_total Chunks read from the object store\n");
        output.push_str("# TYPE object_store_chunks_read_total counter\n");
        output.push_str(&format!(
            "object_store_chunks_read_total {}\n",
            self.chunks_read.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP object_store_chunk_integrity_failures_total Chunk reads that failed size or hash verification\n");
        output.push_str("# TYPE object_store_chunk_integrity_failures_total counter\n");
        output.push_str(&format!(
            "object_store_chunk_integrity_failures_total {}\n",
            self.chunk_integrity_failures.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP object_store_objects_chunked_total Objects large enough to require chunked storage\n");
        output.push_str("# TYPE object_store_objects_chunked_total counter\n");
        output.push_str(&format!(
            "object_store_objects_chunked_total {}\n",
            self.objects_chunked.load(Ordering::Relaxed)
        ));

        // Coalescing metrics
        output.push_str("\n# HELP coalescing_leader_total Requests that became the coalescing leader\n");
        output.push_str("# TYPE coalescing_leader_total counter\n");
        output.push_str(&format!(
            "coalescing_leader_total {}\n",
            self.coalescing_leader_count.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP coalescing_follower_total Requests that joined an in-flight fetch\n");
        output.push_str("# TYPE coalescing_follower_total counter\n");
        output.push_str(&format!(
            "coalescing_follower_total {}\n",
            self.coalescing_follower_count.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP coalescing_dedup_ratio Fraction of concurrent requests deduplicated by single-flight coalescing\n");
        output.push_str("# TYPE coalescing_dedup_ratio gauge\n");
        output.push_str(&format!(
            "coalescing_dedup_ratio {:.4}\n",
            self.coalescing_dedup_ratio()
        ));

        // Fallback streaming metrics
        output.push_str("\n# HELP fallback_invocations_total Requests served via the non-blocking fallback streamer\n");
        output.push_str("# TYPE fallback_invocations_total counter\n");
        output.push_str(&format!(
            "fallback_invocations_total {}\n",
            self.fallback_invocations.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP fallback_hard_skips_total Responses too large to cache, streamed without persistence\n");
        output.push_str("# TYPE fallback_hard_skips_total counter\n");
        output.push_str(&format!(
            "fallback_hard_skips_total {}\n",
            self.fallback_hard_skips.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP fallback_persist_failures_total Background persistence failures after a tee to the client succeeded\n");
        output.push_str("# TYPE fallback_persist_failures_total counter\n");
        output.push_str(&format!(
            "fallback_persist_failures_total {}\n",
            self.fallback_persist_failures.load(Ordering::Relaxed)
        ));

        // Upstream operation metrics
        output.push_str("\n# HELP upstream_operations_total Upstream transformer requests by operation\n");
        output.push_str("# TYPE upstream_operations_total counter\n");
        if let Ok(ops) = self.upstream_operations.lock() {
            for (operation, count) in ops.iter() {
                output.push_str(&format!(
                    "upstream_operations_total{{operation=\"{}\"}} {}\n",
                    operation, count
                ));
            }
        }

        output.push_str("\n# HELP upstream_errors_total Upstream transformer errors by class\n");
        output.push_str("# TYPE upstream_errors_total counter\n");
        if let Ok(errors) = self.upstream_errors.lock() {
            for (error_class, count) in errors.iter() {
                output.push_str(&format!(
                    "upstream_errors_total{{error_class=\"{}\"}} {}\n",
                    error_class, count
                ));
            }
        }

        // System metrics
        output.push_str("\n# HELP active_connections Current number of active connections\n");
        output.push_str("# TYPE active_connections gauge\n");
        output.push_str(&format!(
            "active_connections {}\n",
            self.active_connections.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP bytes_sent_total Total bytes sent to clients\n");
        output.push_str("# TYPE bytes_sent_total counter\n");
        output.push_str(&format!(
            "bytes_sent_total {}\n",
            self.bytes_sent.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP bytes_received_total Total bytes received from clients\n");
        output.push_str("# TYPE bytes_received_total counter\n");
        output.push_str(&format!(
            "bytes_received_total {}\n",
            self.bytes_received.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP memory_usage_bytes Current memory usage (RSS)\n");
        output.push_str("# TYPE memory_usage_bytes gauge\n");
        output.push_str(&format!(
            "memory_usage_bytes {}\n",
            self.memory_usage.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP uptime_seconds Proxy uptime in seconds\n");
        output.push_str("# TYPE uptime_seconds gauge\n");
        output.push_str(&format!(
            "uptime_seconds {}\n",
            self.uptime_seconds.load(Ordering::Relaxed)
        ));

        // Configuration reload metrics
        output.push_str("\n# HELP config_reload_success_total Successful configuration reloads\n");
        output.push_str("# TYPE config_reload_success_total counter\n");
        output.push_str(&format!(
            "config_reload_success_total {}\n",
            self.reload_success.load(Ordering::Relaxed)
        ));

        output.push_str(
            "\n# HELP config_reload_failure_total Failed configuration reload attempts\n",
        );
        output.push_str("# TYPE config_reload_failure_total counter\n");
        output.push_str(&format!(
            "config_reload_failure_total {}\n",
            self.reload_failure.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP config_generation Current configuration generation number\n");
        output.push_str("# TYPE config_generation gauge\n");
        output.push_str(&format!(
            "config_generation {}\n",
            self.config_generation.load(Ordering::Relaxed)
        ));

        output.push_str(
            "\n# HELP concurrency_limit_rejections_total Requests rejected due to concurrency limit (503)\n",
        );
        output.push_str("# TYPE concurrency_limit_rejections_total counter\n");
        output.push_str(&format!(
            "concurrency_limit_rejections_total {}\n",
            self.concurrency_limit_rejections.load(Ordering::Relaxed)
        ));

        // Retry metrics
        output.push_str("\n# HELP upstream_retry_attempts_total Total retry attempts per source\n");
        output.push_str("# TYPE upstream_retry_attempts_total counter\n");
        let retry_attempts = self.retry_attempts.lock().unwrap();
        for (source, count) in retry_attempts.iter() {
            output.push_str(&format!(
                "upstream_retry_attempts_total{{source=\"{}\"}} {}\n",
                source, count
            ));
        }

        output.push_str("\n# HELP upstream_retry_success_total Successful retries per source (eventually succeeded)\n");
        output.push_str("# TYPE upstream_retry_success_total counter\n");
        let retry_success = self.retry_success.lock().unwrap();
        for (source, count) in retry_success.iter() {
            output.push_str(&format!(
                "upstream_retry_success_total{{source=\"{}\"}} {}\n",
                source, count
            ));
        }

        output.push_str("\n# HELP upstream_retry_exhausted_total Retries exhausted per source (all attempts failed)\n");
        output.push_str("# TYPE upstream_retry_exhausted_total counter\n");
        let retry_exhausted = self.retry_exhausted.lock().unwrap();
        for (source, count) in retry_exhausted.iter() {
            output.push_str(&format!(
                "upstream_retry_exhausted_total{{source=\"{}\"}} {}\n",
                source, count
            ));
        }

        // Security validation metrics
        output.push_str("\n# HELP security_payload_too_large_total Requests rejected due to payload size exceeding limit (413)\n");
        output.push_str("# TYPE security_payload_too_large_total counter\n");
        output.push_str(&format!(
            "security_payload_too_large_total {}\n",
            self.security_payload_too_large.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP security_headers_too_large_total Requests rejected due to headers size exceeding limit (431)\n");
        output.push_str("# TYPE security_headers_too_large_total counter\n");
        output.push_str(&format!(
            "security_headers_too_large_total {}\n",
            self.security_headers_too_large.load(Ordering::Relaxed)
        ));

        output.push_str("\n# HELP security_uri_too_long_total Requests rejected due to URI length exceeding limit (414)\n");
        output.push_str("# TYPE security_uri_too_long_total counter\n");
        output.push_str(&format!(
            "security_uri_too_long_total {}\n",
            self.security_uri_too_long.load(Ordering::Relaxed)
        ));

        // Request duration histogram (p50, p95, p99)
        let histogram = self.get_duration_histogram();
        output.push_str("\n# HELP http_request_duration_seconds Request duration in seconds\n");
        output.push_str("# TYPE http_request_duration_seconds summary\n");
        output.push_str(&format!(
            "http_request_duration_seconds{{quantile=\"0.5\"}} {:.3}\n",
            histogram.p50 / 1000.0 // Convert ms to seconds
        ));
        output.push_str(&format!(
            "http_request_duration_seconds{{quantile=\"0.9\"}} {:.3}\n",
            histogram.p90 / 1000.0
        ));
        output.push_str(&format!(
            "http_request_duration_seconds{{quantile=\"0.95\"}} {:.3}\n",
            histogram.p95 / 1000.0
        ));
        output.push_str(&format!(
            "http_request_duration_seconds{{quantile=\"0.99\"}} {:.3}\n",
            histogram.p99 / 1000.0
        ));

        // Backend health per source (1=healthy, 0=unhealthy)
        output.push_str(
            "\n# HELP backend_health Backend health status per source (1=healthy, 0=unhealthy)\n",
        );
        output.push_str("# TYPE backend_health gauge\n");
        if let Ok(health) = self.backend_health.lock() {
            for (source, is_healthy) in health.iter() {
                output.push_str(&format!(
                    "backend_health{{source=\"{}\"}} {}\n",
                    source,
                    if *is_healthy { 1 } else { 0 }
                ));
            }
        }

        output
    }
}

/// Calculate percentiles from a sorted vector of samples (in microseconds)
fn calculate_histogram(samples: &[u64]) -> Histogram {
    if samples.is_empty() {
        return empty_histogram();
    }

    let mut sorted: Vec<u64> = samples.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p90_idx = (sorted.len() as f64 * 0.90) as usize;
    let p95_idx = (sorted.len() as f64 * 0.95) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    // Convert from microseconds to milliseconds
    Histogram {
        p50: sorted.get(p50_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p90: sorted.get(p90_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p95: sorted.get(p95_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
        p99: sorted.get(p99_idx.saturating_sub(1)).copied().unwrap_or(0) as f64 / 1000.0,
    }
}

fn empty_histogram() -> Histogram {
    Histogram {
        p50: 0.0,
        p90: 0.0,
        p95: 0.0,
        p99: 0.0,
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
