//! Testable property 8 (spec.md §8): requests carrying `debug=view` or
//! `nocache=1`-shaped bypass triggers do not read from or write to either
//! cache tier — every such request must reach `fetchUpstream`, and no
//! durable entry must land afterwards.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::edge_cache::EdgeCache;
use videogate::object_store::ChunkedObjectStore;
use videogate::upstream::FetchUpstream;

async fn assert_bypasses(query: &str) {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/bypass.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);
    let fetch = Arc::new(CountingFetch::new(200, "video/mp4", Bytes::from_static(b"bypassed")));
    let fetch_dyn: Arc<dyn FetchUpstream> = fetch.clone();

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::request("/videos/bypass.mp4", query), &recipe, test_harness::ORIGIN, fetch_dyn)
        .await;

    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers.get("x-cache-status").unwrap(), "bypass");
    assert_eq!(fetch.call_count(), 1, "a bypassed request must still reach fetchUpstream");

    // Give any accidental background write a moment, then confirm nothing landed.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!h.store.exists(&key).await.unwrap_or(true), "bypass must not populate the durable tier");
    assert!(h.edge.get(&key).await.is_none(), "bypass must not populate the edge tier");
}

#[tokio::test]
async fn debug_query_param_bypasses_both_tiers() {
    assert_bypasses("debug").await;
}

#[tokio::test]
async fn nocache_query_param_bypasses_both_tiers() {
    assert_bypasses("nocache").await;
}

#[tokio::test]
async fn repeated_bypassed_requests_each_call_upstream_again() {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/bypass2.mp4");
    let fetch = Arc::new(CountingFetch::new(200, "video/mp4", Bytes::from_static(b"bypassed")));
    let fetch_dyn: Arc<dyn FetchUpstream> = fetch.clone();

    for _ in 0..3 {
        let resp = h
            .orchestrator
            .serve_cached(&test_harness::request("/videos/bypass2.mp4", "debug"), &recipe, test_harness::ORIGIN, fetch_dyn.clone())
            .await;
        assert_eq!(resp.headers.get("x-cache-status").unwrap(), "bypass");
    }

    assert_eq!(fetch.call_count(), 3, "bypass must never be satisfied from a prior bypass call");
}
