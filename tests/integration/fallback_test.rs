//! Testable property 11 and scenarios S5/S6 (spec.md §8): when the
//! transformer signals `SourceTooLarge`, the gateway must fall back to
//! streaming the origin body straight through. Under the hard-skip
//! threshold it tees the body to a background persist (S5: a later request
//! hits the durable tier); over the threshold it serves untouched with no
//! persistence at all (S6: `exists(fp) = false` afterwards).

use std::sync::Arc;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch, SourceTooLargeFetch};
use videogate::object_store::ChunkedObjectStore;
use videogate::upstream::FetchUpstream;

#[tokio::test]
async fn oversize_fallback_serves_full_body_and_persists_in_the_background() {
    // S5: source too large for the transformer, but under the default
    // 128 MiB hard skip threshold — tee to client and persist.
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/huge.mp4");
    let body = Bytes::from(vec![0x42u8; 4096]);
    let fetch: Arc<dyn FetchUpstream> = Arc::new(SourceTooLargeFetch {
        content_length: Some(body.len() as u64),
        body: body.clone(),
    });

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::request("/videos/huge.mp4", ""), &recipe, test_harness::ORIGIN, fetch.clone())
        .await;

    assert_eq!(resp.status, 200);
    let served = test_harness::collect_body(resp.body).await;
    assert_eq!(served, body, "client must receive the full origin body untouched");

    let key = videogate::fingerprint::fingerprint(&recipe);
    let landed = test_harness::wait_until(50, std::time::Duration::from_millis(5), || {
        let store = h.store.clone();
        let key = key.clone();
        async move { store.exists(&key).await.unwrap_or(false) }
    })
    .await;
    assert!(landed, "S5: background persistence must land even though the transformer rejected the source");

    // A subsequent request should now hit the durable tier without calling
    // fetchUpstream again (a stable upstream would be expected to, but
    // here the *same* SourceTooLarge fetch proves the hit bypassed it).
    let second = h
        .orchestrator
        .serve_cached(&test_harness::request("/videos/huge.mp4", ""), &recipe, test_harness::ORIGIN, fetch)
        .await;
    assert_eq!(second.headers.get("x-cache-status").unwrap(), "hit-durable");
    let second_body = test_harness::collect_body(second.body).await;
    assert_eq!(second_body, body);
}

#[tokio::test]
async fn oversize_skip_serves_without_ever_persisting() {
    // S6: source content-length over the configured hard-skip threshold —
    // serve streamed through, never touch the durable tier.
    let mut cache_config = videogate::config::CacheConfig::default();
    cache_config.fallback_hard_skip_threshold_bytes = 1024;

    let store = Arc::new(videogate::object_store::KvChunkedObjectStore::new(
        Arc::new(videogate::object_store::InMemoryKv::new()),
        1024 * 1024,
        1024 * 1024,
        1000,
        4,
    ));
    let orchestrator = Arc::new(videogate::orchestrator::CacheOrchestrator::new(
        Arc::new(videogate::edge_cache::MokaEdgeCache::new(1024 * 1024, 1024 * 1024)),
        store.clone(),
        Arc::new(videogate::version::InMemoryVersionStore::new()),
        Arc::new(videogate::metrics::Metrics::new()),
        cache_config,
        videogate::config::BypassConfig::default(),
    ));

    let recipe = test_harness::recipe("/videos/toobig.mp4");
    let body = Bytes::from(vec![0x7Eu8; 2048]); // over the 1024-byte hard-skip threshold
    let fetch: Arc<dyn FetchUpstream> = Arc::new(SourceTooLargeFetch {
        content_length: Some(body.len() as u64),
        body: body.clone(),
    });

    let resp = orchestrator
        .serve_cached(&test_harness::request("/videos/toobig.mp4", ""), &recipe, test_harness::ORIGIN, fetch)
        .await;

    assert_eq!(resp.status, 200);
    let served = test_harness::collect_body(resp.body).await;
    assert_eq!(served, body);

    // give any errant background task a moment, then confirm nothing landed.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let key = videogate::fingerprint::fingerprint(&recipe);
    assert!(!store.exists(&key).await.unwrap_or(true), "S6: hard-skipped bodies must never reach the durable tier");
}

#[tokio::test]
async fn ordinary_cacheable_miss_does_not_invoke_the_fallback_path_at_all() {
    // sanity check: a normal 200 video/mp4 response never goes through
    // fallback bookkeeping, it persists via the ordinary miss path.
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/normal.mp4");
    let fetch: Arc<dyn FetchUpstream> = Arc::new(CountingFetch::new(200, "video/mp4", Bytes::from_static(b"ordinary")));

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::request("/videos/normal.mp4", ""), &recipe, test_harness::ORIGIN, fetch)
        .await;
    assert_eq!(resp.headers.get("x-cache-status").unwrap(), "miss");
}
