//! End-to-end scenarios S1-S7 (spec.md §8). S2 (chunked store exact
//! boundaries), S3 (range across a chunk boundary), S4 (single-flight under
//! load), S5/S6 (oversize fallback/skip), and S7 (version bump on miss) are
//! covered at a test-friendly scale by `chunk_integrity_test.rs`,
//! `range_test.rs`, `single_flight_test.rs`, `fallback_test.rs`, and
//! `cache_miss_bump_test.rs` respectively — this file covers S1 directly,
//! since it's the one scenario not already a dedicated test's namesake.

use std::sync::Arc;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::edge_cache::EdgeCache;
use videogate::object_store::ChunkedObjectStore;
use videogate::upstream::FetchUpstream;

#[tokio::test]
async fn s1_cold_miss_small_video_then_durable_hit() {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/sample.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);

    assert!(!h.store.exists(&key).await.unwrap(), "durable tier must start empty");
    assert!(h.edge.get(&key).await.is_none(), "edge tier must start empty");

    let body = Bytes::from(vec![0xABu8; 4 * 1024 * 1024]); // 4 MiB source
    let fetch: Arc<dyn FetchUpstream> = Arc::new(CountingFetch::new(200, "video/mp4", body.clone()));
    let req = test_harness::request("/videos/sample.mp4", "");

    let first = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch.clone()).await;
    assert_eq!(first.status, 200);
    assert_eq!(first.headers.get("x-cache-status").unwrap(), "miss");

    let landed = test_harness::wait_until(200, std::time::Duration::from_millis(5), || {
        let store = h.store.clone();
        let key = key.clone();
        async move { store.exists(&key).await.unwrap_or(false) }
    })
    .await;
    assert!(landed, "the durable tier must hold a single value after one request");

    let second = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch).await;
    assert_eq!(second.headers.get("x-cache-status").unwrap(), "hit-durable");
    let second_body = test_harness::collect_body(second.body).await;
    assert_eq!(second_body, body);
}
