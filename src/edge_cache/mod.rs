//! Component E: edge cache adapter (§4.E).
//!
//! The ephemeral, eventually-consistent tier in front of the durable object
//! store. Grounded on the teacher's `cache::memory::MemoryCache` (moka
//! builder, weigher, eviction listener, `async_trait`-based `Cache` trait)
//! generalized the same way `cache::traits::Cache` generalizes memory vs.
//! Redis — here the swap target is a real CDN-edge API rather than another
//! process-local cache — and on `proxy::cache_handler`'s conditional-
//! request/synthetic-header posture, moved from match-time validation to
//! write-time synthesis.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EdgeCacheError {
    #[error("edge cache entry exceeds the configured item size limit")]
    TooLarge,
    #[error("edge cache backend error: {0}")]
    Backend(String),
}

/// A cached entry as stored by the edge tier: headers already sanitized,
/// ETag/Last-Modified already synthesized if the origin didn't provide them.
#[derive(Debug, Clone)]
pub struct EdgeEntry {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: SystemTime,
}

/// Three lookup variants the orchestrator races concurrently (§4.E
/// `match`): the literal request, path-only, and path+Accept.
pub struct MatchKeys {
    pub original: String,
    pub path_only: String,
    pub path_with_accept: Option<String>,
}

#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn put(
        &self,
        key: &str,
        status: u16,
        headers: HeaderMap,
        body: Bytes,
        ttl: Duration,
    ) -> Result<(), EdgeCacheError>;

    async fn get(&self, key: &str) -> Option<EdgeEntry>;

    async fn invalidate(&self, key: &str);
}

/// Strips headers that must never survive a cache write (`Set-Cookie`,
/// `Vary`, `Transfer-Encoding`), sets an exact `Content-Length` and
/// `Accept-Ranges: bytes`, and synthesizes `ETag`/`Last-Modified` from the
/// body hash and current time when the origin didn't provide them.
pub fn prepare_for_storage(mut headers: HeaderMap, body: &Bytes) -> HeaderMap {
    headers.remove(http::header::SET_COOKIE);
    headers.remove(http::header::VARY);
    headers.remove(http::header::TRANSFER_ENCODING);

    headers.insert(
        http::header::CONTENT_LENGTH,
        http::HeaderValue::from_str(&body.len().to_string()).expect("length is always valid ASCII"),
    );
    headers.insert(http::header::ACCEPT_RANGES, http::HeaderValue::from_static("bytes"));

    if !headers.contains_key(http::header::ETAG) {
        if let Ok(value) = http::HeaderValue::from_str(&synthesize_etag(body)) {
            headers.insert(http::header::ETAG, value);
        }
    }

    if !headers.contains_key(http::header::LAST_MODIFIED) {
        if let Ok(value) = http::HeaderValue::from_str(&synthesize_last_modified(SystemTime::now())) {
            headers.insert(http::header::LAST_MODIFIED, value);
        }
    }

    headers
}

fn synthesize_etag(body: &Bytes) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("\"{}\"", hex)
}

fn synthesize_last_modified(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let dt: DateTime<Utc> = DateTime::from_timestamp(secs as i64, 0).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap());
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Builds the synthetic minimal-GET storage key the same way the teacher's
/// `proxy::response_handler::build_cache_key` folds bucket+path+variant into
/// one key — here the variant is already folded into `fp` upstream, so this
/// only joins origin and path.
pub fn storage_key(origin: &str, path: &str) -> String {
    format!("{}{}", origin.trim_end_matches('/'), path)
}

pub fn match_keys(origin: &str, path: &str, accept: Option<&str>) -> MatchKeys {
    MatchKeys {
        original: storage_key(origin, path),
        path_only: path.to_string(),
        path_with_accept: accept.map(|a| format!("{}|accept={}", path, a)),
    }
}

/// Fires the three lookups concurrently via `tokio::join!` and returns the
/// first hit, original request first.
pub async fn lookup_first_match(cache: &dyn EdgeCache, keys: &MatchKeys) -> Option<EdgeEntry> {
    let accept_key = keys.path_with_accept.clone();

    let original = cache.get(&keys.original);
    let path_only = cache.get(&keys.path_only);
    let path_with_accept = async {
        match &accept_key {
            Some(k) => cache.get(k).await,
            None => None,
        }
    };

    let (o, p, a) = tokio::join!(original, path_only, path_with_accept);
    o.or(p).or(a)
}

/// `moka`-backed implementation, equivalent in spirit to the teacher's
/// `MemoryCache` (capacity-weighed by byte size, async `get`/`insert` calls
/// through `moka::future::Cache` exactly as `MemoryCache` does).
pub struct MokaEdgeCache {
    cache: moka::future::Cache<String, EdgeEntry>,
    max_item_size_bytes: u64,
}

impl MokaEdgeCache {
    pub fn new(max_capacity_bytes: u64, max_item_size_bytes: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_capacity_bytes)
            .weigher(|_key: &String, entry: &EdgeEntry| -> u32 { entry.body.len().min(u32::MAX as usize) as u32 })
            .build();
        Self {
            cache,
            max_item_size_bytes,
        }
    }
}

#[async_trait]
impl EdgeCache for MokaEdgeCache {
    async fn put(&self, key: &str, status: u16, headers: HeaderMap, body: Bytes, _ttl: Duration) -> Result<(), EdgeCacheError> {
        if body.len() as u64 > self.max_item_size_bytes {
            return Err(EdgeCacheError::TooLarge);
        }
        let headers = prepare_for_storage(headers, &body);
        self.cache
            .insert(
                key.to_string(),
                EdgeEntry {
                    status,
                    headers,
                    body,
                    stored_at: SystemTime::now(),
                },
            )
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<EdgeEntry> {
        self.cache.get(key).await
    }

    async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }
}
