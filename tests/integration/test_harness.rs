//! Shared fixture for the `tests/integration/*_test.rs` suite, the same
//! role the teacher's own `tests/integration/test_harness.rs` plays —
//! except that harness spawns a release binary and polls `/health` over
//! HTTP, which needs a built binary and a running server loop neither of
//! which this crate provides (see `src/proxy/mod.rs`'s module doc). This
//! harness instead wires the library's components directly, in the style
//! of `tests/integration/cache_write_through_test.rs` and
//! `tests/integration/request_coalescing_test.rs`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};

use videogate::config::{BypassConfig, CacheConfig};
use videogate::edge_cache::MokaEdgeCache;
use videogate::error::ProxyError;
use videogate::metrics::Metrics;
use videogate::object_store::{InMemoryKv, KvChunkedObjectStore};
use videogate::orchestrator::CacheOrchestrator;
use videogate::recipe::{Mode, TransformRecipe};
use videogate::types::GatewayRequest;
use videogate::upstream::{FetchUpstream, UpstreamRequest, UpstreamResponse, UpstreamStreamResponse};
use videogate::version::InMemoryVersionStore;

pub const ORIGIN: &str = "http://transformer.internal";

/// Everything a test needs: the orchestrator under test plus direct handles
/// to its durable store and edge cache, so assertions can inspect storage
/// state without going through `ServeCached` a second time.
pub struct Harness {
    pub orchestrator: Arc<CacheOrchestrator>,
    pub store: Arc<KvChunkedObjectStore>,
    pub edge: Arc<MokaEdgeCache>,
    pub versions: Arc<InMemoryVersionStore>,
}

/// Default harness: thresholds large enough that ordinary small test
/// bodies never chunk.
pub fn harness() -> Harness {
    harness_with_thresholds(1024 * 1024, 1024 * 1024)
}

/// Harness with explicit chunk threshold / standard chunk size, for tests
/// that need small bodies to exercise the chunked path deterministically.
pub fn harness_with_thresholds(chunk_threshold_bytes: u64, standard_chunk_size_bytes: u64) -> Harness {
    let store = Arc::new(KvChunkedObjectStore::new(
        Arc::new(InMemoryKv::new()),
        chunk_threshold_bytes,
        standard_chunk_size_bytes,
        1000,
        4,
    ));
    let edge = Arc::new(MokaEdgeCache::new(16 * 1024 * 1024, 16 * 1024 * 1024));
    let versions = Arc::new(InMemoryVersionStore::new());
    let orchestrator = Arc::new(CacheOrchestrator::new(
        edge.clone(),
        store.clone(),
        versions.clone(),
        Arc::new(Metrics::new()),
        CacheConfig::default(),
        BypassConfig::default(),
    ));
    Harness { orchestrator, store, edge, versions }
}

pub fn recipe(path: &str) -> TransformRecipe {
    TransformRecipe::from_minimal(path.to_string(), Mode::Video)
}

pub fn request(path: &str, query: &str) -> GatewayRequest {
    GatewayRequest {
        method: Method::GET,
        path: path.to_string(),
        query: query.to_string(),
        headers: HeaderMap::new(),
    }
}

pub fn request_with_headers(path: &str, query: &str, headers: HeaderMap) -> GatewayRequest {
    GatewayRequest {
        method: Method::GET,
        path: path.to_string(),
        query: query.to_string(),
        headers,
    }
}

pub fn range_request(path: &str, range: &str) -> GatewayRequest {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::RANGE, http::HeaderValue::from_str(range).unwrap());
    request_with_headers(path, "", headers)
}

/// A `FetchUpstream` stub that always returns the same buffered response
/// and counts how many times it was actually invoked, with an optional
/// artificial delay for coalescing-window tests.
pub struct CountingFetch {
    pub calls: AtomicU32,
    pub status: u16,
    pub content_type: &'static str,
    pub body: Bytes,
    pub delay: Duration,
    pub last_url: std::sync::Mutex<Option<String>>,
}

impl CountingFetch {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            status,
            content_type,
            body: body.into(),
            delay: Duration::from_millis(0),
            last_url: std::sync::Mutex::new(None),
        }
    }

    pub fn with_delay(status: u16, content_type: &'static str, body: impl Into<Bytes>, delay: Duration) -> Self {
        Self {
            calls: AtomicU32::new(0),
            status,
            content_type,
            body: body.into(),
            delay,
            last_url: std::sync::Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.last_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchUpstream for CountingFetch {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap() = Some(req.url);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_str(self.content_type).unwrap());
        Ok(UpstreamResponse {
            status: self.status,
            headers,
            content_type: self.content_type.to_string(),
            body: self.body.clone(),
        })
    }

    async fn fetch_stream(&self, _req: UpstreamRequest) -> Result<UpstreamStreamResponse, ProxyError> {
        Err(ProxyError::Internal("CountingFetch does not stream".to_string()))
    }
}

/// A `FetchUpstream` stub standing in for the transformer's `SourceTooLarge`
/// sentinel (§7): `fetch` always fails that way, `fetch_stream` hands back
/// the origin body with a caller-supplied `Content-Length` so the Fallback
/// Streamer can decide hard-skip vs. tee-and-persist.
pub struct SourceTooLargeFetch {
    pub content_length: Option<u64>,
    pub body: Bytes,
}

#[async_trait]
impl FetchUpstream for SourceTooLargeFetch {
    async fn fetch(&self, _req: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        Err(ProxyError::SourceTooLarge)
    }

    async fn fetch_stream(&self, _req: UpstreamRequest) -> Result<UpstreamStreamResponse, ProxyError> {
        let body = self.body.clone();
        Ok(UpstreamStreamResponse {
            status: 200,
            headers: HeaderMap::new(),
            content_length: self.content_length,
            body: Box::pin(futures::stream::iter(vec![Ok(body)])),
        })
    }
}

/// Drains a `ResponseBody` (buffered or streamed) to a single `Bytes`.
pub async fn collect_body(body: videogate::types::ResponseBody) -> Bytes {
    use bytes::BytesMut;
    use futures::StreamExt;
    match body {
        videogate::types::ResponseBody::Full(b) => b,
        videogate::types::ResponseBody::Stream(mut s) => {
            let mut out = BytesMut::new();
            while let Some(chunk) = s.next().await {
                out.extend_from_slice(&chunk.expect("stream item"));
            }
            out.freeze()
        }
    }
}

/// Polls until `cond` is true or `attempts` is exhausted, sleeping
/// `step` between tries. Used to wait for a fire-and-forget background
/// persistence/seed task without a fixed sleep.
pub async fn wait_until<F, Fut>(attempts: u32, step: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if cond().await {
            return true;
        }
        tokio::time::sleep(step).await;
    }
    false
}
