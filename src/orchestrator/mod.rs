//! Component H: cache orchestrator, `ServeCached` (§4.H).
//!
//! Composes every other component (fingerprint, version store, edge cache,
//! durable object store, range engine, coalescer, fallback streamer) into
//! the single entry point the proxy glue calls per request. Grounded on the
//! teacher's `proxy::cache_handler` result-enum style (`CacheLookup`,
//! `CoalescerAcquisition`) and `cache::tiered::TieredCache`'s background
//! `tokio::spawn` promotion-on-hit pattern, generalized from "promote
//! between cache layers" to "promote from durable tier up to edge tier, and
//! from upstream down into durable tier".

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::stream::StreamExt;
use http::{HeaderMap, HeaderValue, Method};

use crate::coalescing::{CoalesceRole, CoalescedResponse, Coalescer};
use crate::config::{BypassConfig, CacheConfig};
use crate::error::ProxyError;
use crate::fallback::{self, FallbackContext, OriginResponse};
use crate::fingerprint::{self, strip_volatile_query};
use crate::metrics::Metrics;
use crate::object_store::manifest::ObjectMetadata;
use crate::object_store::{now_ms, ChunkedObjectStore, RetrievedObject};
use crate::edge_cache::{self, EdgeCache};
use crate::range::{self, RangeOutcome};
use crate::recipe::TransformRecipe;
use crate::retry::RetryPolicy;
use crate::types::{GatewayRequest, GatewayResponse, ResponseBody};
use crate::upstream::{with_version_param, FetchUpstream, UpstreamRequest};
use crate::version::VersionStore;

const X_CACHE_STATUS: &str = "x-cache-status";
const X_CACHE_VERSION: &str = "x-cache-version";
const X_CACHE_KEY: &str = "x-cache-key";
const X_CACHE_TTL: &str = "x-cache-ttl";

/// Per-key bookkeeping backing `GetDiagnostics`, kept in the orchestrator
/// rather than in a collaborator since nothing else needs it.
#[derive(Debug, Clone, Default)]
struct DiagnosticsRecord {
    last_seen_ms: i64,
    hit_count: u64,
    last_size_bytes: Option<u64>,
}

/// `{version, lastSeen, hitCount?, sizes?}` as named in §6.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    pub version: u32,
    pub last_seen_ms: Option<i64>,
    pub hit_count: Option<u64>,
    pub size_bytes: Option<u64>,
}

/// Where a response's bytes actually came from, driving the
/// `X-Cache-Status` header and the matching metrics counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheOutcome {
    HitEdge,
    HitDurable,
    Miss,
    Bypass,
}

impl CacheOutcome {
    fn header_value(self) -> &'static str {
        match self {
            CacheOutcome::HitEdge => "hit-edge",
            CacheOutcome::HitDurable => "hit-durable",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Bypass => "bypass",
        }
    }
}

/// Everything `ServeCached` needs, composed once at startup and shared
/// across requests. One instance per process; cheap to `Clone` since every
/// field is itself an `Arc` or a plain value.
#[derive(Clone)]
pub struct CacheOrchestrator {
    edge: Arc<dyn EdgeCache>,
    store: Arc<dyn ChunkedObjectStore>,
    versions: Arc<dyn VersionStore>,
    coalescer: Coalescer,
    metrics: Arc<Metrics>,
    cache_config: CacheConfig,
    bypass_config: BypassConfig,
    diagnostics: Arc<tokio::sync::Mutex<HashMap<String, DiagnosticsRecord>>>,
    retry: RetryPolicy,
}

impl CacheOrchestrator {
    pub fn new(
        edge: Arc<dyn EdgeCache>,
        store: Arc<dyn ChunkedObjectStore>,
        versions: Arc<dyn VersionStore>,
        metrics: Arc<Metrics>,
        cache_config: CacheConfig,
        bypass_config: BypassConfig,
    ) -> Self {
        Self {
            edge,
            store,
            versions,
            coalescer: Coalescer::new(),
            metrics,
            cache_config,
            bypass_config,
            diagnostics: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            retry: RetryPolicy::new(3, 100, 1000),
        }
    }

    /// The entry point collaborators call per request (§4.H, §6
    /// `ServeCached`). `origin_base_url` is the transformer RPC endpoint for
    /// the routed source; `fetch` performs the actual transformer/origin
    /// call.
    pub async fn serve_cached(
        &self,
        req: &GatewayRequest,
        recipe: &TransformRecipe,
        origin_base_url: &str,
        fetch: Arc<dyn FetchUpstream>,
    ) -> GatewayResponse {
        let key = fingerprint::fingerprint(recipe);
        let version = self.versions.get_version(&key).await.unwrap_or(1);

        if let Some(reason) = self.bypass_reason(req) {
            self.metrics.increment_cache_bypass(reason);
            let url = self.build_upstream_url(origin_base_url, req, 1);
            return match fetch.fetch(upstream_request(req, url)).await {
                Ok(resp) => self.tag_response(resp.status, resp.headers, ResponseBody::Full(resp.body), CacheOutcome::Bypass, &key, version, None),
                Err(e) => self.error_response(e),
            };
        }

        // Edge tier lookup (§4.E `match`, raced across three key shapes).
        let match_keys = edge_cache::match_keys(origin_base_url, &req.path, req.header_str("accept"));
        if let Some(entry) = edge_cache::lookup_first_match(self.edge.as_ref(), &match_keys).await {
            self.metrics.increment_cache_hit();
            self.record_hit(&key, entry.body.len() as u64).await;
            let ttl = self.cache_config.ttl.for_status(entry.status);
            let remaining = ttl_remaining(ttl, entry.stored_at);
            return self.tag_response(entry.status, entry.headers, ResponseBody::Full(entry.body), CacheOutcome::HitEdge, &key, version, remaining);
        }

        // Durable tier lookup (§4.H step 4).
        match self.store.get_object(&key).await {
            Ok(Some(obj)) => {
                self.metrics.increment_cache_hit();
                return self.serve_from_durable(req, obj, &key, version).await;
            }
            Ok(None) => {}
            Err(e) => {
                // Storage errors degrade silently to fetch-and-serve (§7).
                tracing::warn!(key = %key, error = %e, "durable tier lookup failed, falling through to upstream");
            }
        }

        self.metrics.increment_cache_miss();
        self.serve_miss(req, recipe, origin_base_url, &key, fetch).await
    }

    /// Bumps a fingerprint's version without deleting anything, so the next
    /// request for it re-fetches (§6 `InvalidateFingerprint`).
    pub async fn invalidate_fingerprint(&self, key: &str) {
        let _ = self.versions.bump_version(key, true, now_ms()).await;
        self.edge.invalidate(key).await;
    }

    /// `{version, lastSeen, hitCount?, sizes?}` for the debug UI (§6).
    pub async fn get_diagnostics(&self, key: &str) -> Diagnostics {
        let version = self.versions.get_version(key).await.unwrap_or(1);
        let record = self.diagnostics.lock().await.get(key).cloned().unwrap_or_default();
        Diagnostics {
            version,
            last_seen_ms: if record.last_seen_ms > 0 { Some(record.last_seen_ms) } else { None },
            hit_count: if record.hit_count > 0 { Some(record.hit_count) } else { None },
            size_bytes: record.last_size_bytes,
        }
    }

    async fn record_hit(&self, key: &str, size_bytes: u64) {
        let mut table = self.diagnostics.lock().await;
        let entry = table.entry(key.to_string()).or_default();
        entry.last_seen_ms = now_ms();
        entry.hit_count += 1;
        entry.last_size_bytes = Some(size_bytes);
    }

    fn bypass_reason(&self, req: &GatewayRequest) -> Option<&'static str> {
        if req.method != Method::GET {
            return Some("non-get");
        }
        if self.bypass_config.query_params_enabled {
            for (name, flag) in [("debug", "debug"), ("nocache", "nocache"), ("no-kv-cache", "no-kv-cache")] {
                if query_has_flag(&req.query, name) {
                    return Some(flag);
                }
            }
        }
        if self.bypass_config.headers_enabled {
            if req.header_str("cache-control").map(|v| v.contains("no-cache")).unwrap_or(false) {
                return Some("cache-control");
            }
            if req.header_str("x-bypass-cache").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false) {
                return Some("x-bypass-cache");
            }
        }
        None
    }

    fn build_upstream_url(&self, base_url: &str, req: &GatewayRequest, version: u32) -> String {
        let clean_query = strip_volatile_query(&req.query);
        let mut url = format!("{}{}", base_url.trim_end_matches('/'), req.path);
        if !clean_query.is_empty() {
            url.push('?');
            url.push_str(&clean_query);
        }
        with_version_param(&url, version)
    }

    async fn serve_from_durable(&self, req: &GatewayRequest, obj: RetrievedObject, key: &str, version: u32) -> GatewayResponse {
        match obj {
            RetrievedObject::Single { bytes, metadata } => {
                self.record_hit(key, bytes.len() as u64).await;
                let headers = base_headers(&metadata);
                if let Some(range_header) = req.header_str("range") {
                    match range::parse_range(Some(range_header), metadata.content_length) {
                        RangeOutcome::Satisfiable(start, end) => {
                            let slice = bytes.slice(start as usize..=end as usize);
                            let mut headers = headers;
                            headers.insert(http::header::CONTENT_RANGE, header_value(&format!("bytes {}-{}/{}", start, end, metadata.content_length)));
                            self.seed_edge_tier_from_durable(req, 200, HeaderMap::new(), bytes.clone(), &metadata);
                            return self.tag_response(206, headers, ResponseBody::Full(slice), CacheOutcome::HitDurable, key, version, remaining_ttl(&self.cache_config, 200, &metadata));
                        }
                        RangeOutcome::Unsatisfiable => {
                            return GatewayResponse::new(416, HeaderMap::new(), ResponseBody::empty());
                        }
                        RangeOutcome::NotARange | RangeOutcome::MultiRange => {}
                    }
                }
                self.seed_edge_tier_from_durable(req, 200, headers.clone(), bytes.clone(), &metadata);
                self.tag_response(200, headers, ResponseBody::Full(bytes), CacheOutcome::HitDurable, key, version, remaining_ttl(&self.cache_config, 200, &metadata))
            }
            RetrievedObject::Chunked { manifest, metadata, body } => {
                self.record_hit(key, metadata.content_length).await;
                let headers = base_headers(&metadata);

                if let Some(range_header) = req.header_str("range") {
                    match range::parse_range(Some(range_header), manifest.total_size) {
                        RangeOutcome::Satisfiable(start, end) => {
                            match range::serve_range(self.store.clone(), key.to_string(), manifest, start, end) {
                                Ok(ranged) => {
                                    let mut headers = headers;
                                    headers.insert(http::header::CONTENT_RANGE, header_value(&ranged.content_range_header()));
                                    headers.insert(http::header::CONTENT_LENGTH, header_value(&ranged.content_length.to_string()));
                                    let mapped = ranged.stream.map(|r| r.map_err(|e| ProxyError::StorageError(e.to_string())));
                                    return self.tag_response(206, headers, ResponseBody::Stream(Box::pin(mapped)), CacheOutcome::HitDurable, key, version, remaining_ttl(&self.cache_config, 200, &metadata));
                                }
                                Err(e) => return GatewayResponse::new(416, HeaderMap::new(), ResponseBody::Full(Bytes::from(e.to_string()))),
                            }
                        }
                        RangeOutcome::Unsatisfiable => {
                            return GatewayResponse::new(416, HeaderMap::new(), ResponseBody::empty());
                        }
                        RangeOutcome::NotARange | RangeOutcome::MultiRange => {}
                    }
                }

                let mapped = body.map(|r| r.map_err(|e| ProxyError::StorageError(e.to_string())));
                self.tag_response(200, headers, ResponseBody::Stream(Box::pin(mapped)), CacheOutcome::HitDurable, key, version, remaining_ttl(&self.cache_config, 200, &metadata))
            }
        }
    }

    /// Opportunistic background seed of the edge tier after a durable hit
    /// (§4.H step 4). Fire-and-forget: failures are logged, never surfaced.
    fn seed_edge_tier_from_durable(&self, req: &GatewayRequest, status: u16, headers: HeaderMap, body: Bytes, metadata: &ObjectMetadata) {
        let edge = self.edge.clone();
        let storage_key = edge_cache::storage_key(&req.path, "");
        let ttl = self.cache_config.ttl.for_status(status);
        let content_type = metadata.content_type.clone();
        tokio::spawn(async move {
            let mut headers = headers;
            if !headers.contains_key(http::header::CONTENT_TYPE) {
                if let Ok(v) = HeaderValue::from_str(&content_type) {
                    headers.insert(http::header::CONTENT_TYPE, v);
                }
            }
            if let Err(e) = edge.put(&storage_key, status, headers, body, ttl).await {
                tracing::debug!(error = %e, "edge tier seed skipped");
            }
        });
    }

    async fn serve_miss(&self, req: &GatewayRequest, recipe: &TransformRecipe, origin_base_url: &str, key: &str, fetch: Arc<dyn FetchUpstream>) -> GatewayResponse {
        let bumped = match self.versions.bump_version(key, true, now_ms()).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "version bump failed, proceeding with version 1");
                1
            }
        };

        let url = self.build_upstream_url(origin_base_url, req, bumped);
        let method = req.method.clone();
        let headers = req.headers.clone();

        let store = self.store.clone();
        let edge = self.edge.clone();
        let metrics = self.metrics.clone();
        let versions = self.versions.clone();
        let cache_config = self.cache_config.clone();
        let retry = self.retry.clone();
        let key_owned = key.to_string();
        let origin_for_seed = origin_base_url.to_string();
        let path_for_seed = req.path.clone();
        let request_recipe = recipe.clone();
        let fetch_for_handler = fetch.clone();

        let (role, result) = self
            .coalescer
            .do_coalesced(key, move || {
                let url = url.clone();
                let key_owned = key_owned.clone();
                async move {
                    let upstream_req = UpstreamRequest {
                        method,
                        url,
                        headers,
                    };
                    let resp = fetch_for_handler.fetch(upstream_req).await?;

                    if resp.is_success() && resp.is_cacheable_content_type() {
                        let content_type = resp.content_type.clone();
                        let body = resp.body.clone();
                        let status = resp.status;
                        let recipe_echo = recipe_echo(&request_recipe);
                        let store = store.clone();
                        let edge = edge.clone();
                        let metrics = metrics.clone();
                        let versions = versions.clone();
                        let retry = retry.clone();
                        let origin_for_seed = origin_for_seed.clone();
                        let path_for_seed = path_for_seed.clone();

                        tokio::spawn(async move {
                            let ttl = cache_config.ttl.for_status(status);
                            let metadata = ObjectMetadata {
                                content_type: content_type.clone(),
                                content_length: body.len() as u64,
                                created_at_ms: now_ms(),
                                expires_at_ms: now_ms() + ttl.as_millis() as i64,
                                cache_tags: vec![],
                                cache_version: 1,
                                recipe_echo,
                            };

                            let mut attempt = 0u32;
                            loop {
                                match store.put_object(&key_owned, body.clone(), metadata.clone()).await {
                                    Ok(()) => {
                                        metrics.increment_chunks_written(1);
                                        let mut seed_headers = HeaderMap::new();
                                        if let Ok(v) = HeaderValue::from_str(&content_type) {
                                            seed_headers.insert(http::header::CONTENT_TYPE, v);
                                        }
                                        let storage_key = edge_cache::storage_key(&origin_for_seed, &path_for_seed);
                                        if let Err(e) = edge.put(&storage_key, status, seed_headers, body.clone(), ttl).await {
                                            tracing::debug!(error = %e, "edge tier seed after miss skipped");
                                        }
                                        break;
                                    }
                                    Err(e) if retry.should_retry(attempt, 0) && attempt < 3 => {
                                        tracing::warn!(key = %key_owned, attempt, error = %e, "durable tier put failed, retrying");
                                        tokio::time::sleep(retry.backoff_duration(attempt)).await;
                                        attempt += 1;
                                    }
                                    Err(e) => {
                                        // Bump again so the corrupt/missing write never gets served stale (§4.H step 7).
                                        tracing::error!(key = %key_owned, error = %e, "durable tier put failed, bumping version");
                                        let _ = versions.bump_version(&key_owned, true, now_ms()).await;
                                        break;
                                    }
                                }
                            }
                        });
                    }

                    Ok(CoalescedResponse {
                        status: resp.status,
                        headers: resp.headers,
                        body: resp.body,
                    })
                }
            })
            .await;

        match role {
            CoalesceRole::Leader => self.metrics.increment_coalescing_leader(),
            CoalesceRole::Follower => self.metrics.increment_coalescing_follower(),
        }

        match result {
            Ok(coalesced) => self.tag_response(
                coalesced.status,
                coalesced.headers,
                ResponseBody::Full(coalesced.body),
                CacheOutcome::Miss,
                key,
                bumped,
                Some(self.cache_config.ttl.for_status(coalesced.status)),
            ),
            Err(ProxyError::SourceTooLarge) | Err(ProxyError::TransformerRejected(_)) => {
                self.metrics.increment_fallback_invocation();
                self.serve_fallback(req, origin_base_url, key, bumped, fetch).await
            }
            Err(e) => self.error_response(e),
        }
    }

    async fn serve_fallback(&self, req: &GatewayRequest, origin_base_url: &str, key: &str, version: u32, fetch: Arc<dyn FetchUpstream>) -> GatewayResponse {
        let url = self.build_upstream_url(origin_base_url, req, version);
        let upstream_req = upstream_request(req, url);

        let stream_resp = match fetch.fetch_stream(upstream_req).await {
            Ok(r) => r,
            Err(e) => return self.error_response(e),
        };

        let metadata = ObjectMetadata {
            content_type: stream_resp
                .headers
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string(),
            content_length: stream_resp.content_length.unwrap_or(0),
            created_at_ms: now_ms(),
            expires_at_ms: now_ms() + self.cache_config.ttl.for_status(stream_resp.status).as_millis() as i64,
            cache_tags: vec![],
            cache_version: 1,
            recipe_echo: HashMap::new(),
        };

        let origin = OriginResponse {
            status: stream_resp.status,
            headers: stream_resp.headers,
            content_length: stream_resp.content_length,
            body: stream_resp.body,
        };

        let ctx = FallbackContext {
            store: self.store.clone(),
            fp: key.to_string(),
            metadata,
            hard_skip_threshold_bytes: self.cache_config.fallback_hard_skip_threshold_bytes,
        };

        let metrics = self.metrics.clone();
        let (mut response, outcome) = fallback::serve_with_fallback(origin, ctx);
        if outcome == fallback::FallbackOutcome::HardSkipped {
            metrics.increment_fallback_hard_skip();
        }
        response.headers.insert(X_CACHE_STATUS, header_value("miss"));
        response.headers.insert(X_CACHE_KEY, header_value(key));
        response
    }

    fn error_response(&self, error: ProxyError) -> GatewayResponse {
        match error {
            ProxyError::BadRequest(msg) => GatewayResponse::new(400, HeaderMap::new(), ResponseBody::Full(Bytes::from(msg))),
            ProxyError::UpstreamError(msg) => GatewayResponse::new(502, HeaderMap::new(), ResponseBody::Full(Bytes::from(msg))),
            ProxyError::Timeout => GatewayResponse::new(504, HeaderMap::new(), ResponseBody::empty()),
            ProxyError::StorageError(_) | ProxyError::CacheMiss | ProxyError::ClientDisconnected => {
                GatewayResponse::new(502, HeaderMap::new(), ResponseBody::empty())
            }
            ProxyError::IntegrityError(_) => GatewayResponse::new(502, HeaderMap::new(), ResponseBody::empty()),
            ProxyError::SourceTooLarge => GatewayResponse::new(502, HeaderMap::new(), ResponseBody::empty()),
            ProxyError::TransformerRejected(msg) => GatewayResponse::new(502, HeaderMap::new(), ResponseBody::Full(Bytes::from(msg))),
            ProxyError::Config(msg) => GatewayResponse::new(500, HeaderMap::new(), ResponseBody::Full(Bytes::from(msg))),
            ProxyError::Internal(msg) => GatewayResponse::new(500, HeaderMap::new(), ResponseBody::Full(Bytes::from(msg))),
        }
    }

    fn tag_response(
        &self,
        status: u16,
        mut headers: HeaderMap,
        body: ResponseBody,
        outcome: CacheOutcome,
        key: &str,
        version: u32,
        ttl_remaining: Option<Duration>,
    ) -> GatewayResponse {
        headers.insert(X_CACHE_STATUS, header_value(outcome.header_value()));
        headers.insert(X_CACHE_VERSION, header_value(&version.to_string()));
        headers.insert(X_CACHE_KEY, header_value(key));
        if let Some(ttl) = ttl_remaining {
            headers.insert(X_CACHE_TTL, header_value(&ttl.as_secs().to_string()));
        }
        if !headers.contains_key(http::header::ACCEPT_RANGES) {
            headers.insert(http::header::ACCEPT_RANGES, header_value("bytes"));
        }
        GatewayResponse::new(status, headers, body)
    }
}

fn recipe_echo(recipe: &TransformRecipe) -> HashMap<String, String> {
    let mut echo = HashMap::new();
    echo.insert("mode".to_string(), recipe.mode.as_str().to_string());
    if let Some(w) = recipe.width {
        echo.insert("width".to_string(), w.to_string());
    }
    if let Some(h) = recipe.height {
        echo.insert("height".to_string(), h.to_string());
    }
    if let Some(f) = &recipe.format {
        echo.insert("format".to_string(), f.clone());
    }
    echo
}

fn base_headers(metadata: &ObjectMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&metadata.content_type) {
        headers.insert(http::header::CONTENT_TYPE, v);
    }
    headers.insert(http::header::CONTENT_LENGTH, header_value(&metadata.content_length.to_string()));
    headers
}

fn remaining_ttl(cache_config: &CacheConfig, status: u16, metadata: &ObjectMetadata) -> Option<Duration> {
    let ttl = cache_config.ttl.for_status(status);
    let remaining_ms = metadata.expires_at_ms - now_ms();
    if remaining_ms <= 0 {
        Some(Duration::from_secs(0))
    } else {
        Some(ttl.min(Duration::from_millis(remaining_ms as u64)))
    }
}

fn ttl_remaining(ttl: Duration, stored_at: SystemTime) -> Option<Duration> {
    let elapsed = SystemTime::now().duration_since(stored_at).unwrap_or_default();
    Some(ttl.checked_sub(elapsed).unwrap_or_default())
}

fn query_has_flag(query: &str, name: &str) -> bool {
    query.split('&').any(|pair| {
        let key = pair.split('=').next().unwrap_or("");
        key == name
    })
}

fn header_value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn upstream_request(req: &GatewayRequest, url: String) -> UpstreamRequest {
    UpstreamRequest {
        method: req.method.clone(),
        url,
        headers: req.headers.clone(),
    }
}

static _NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_request_id() -> u64 {
    _NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}
