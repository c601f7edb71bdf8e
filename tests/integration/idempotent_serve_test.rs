//! Testable property 5 (spec.md §8): under identical recipe and a stable
//! upstream, two consecutive successful `ServeCached` calls produce
//! byte-equal bodies — regardless of whether the second call is served
//! from upstream again, the durable tier, or the edge tier.

use std::sync::Arc;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::upstream::FetchUpstream;

#[tokio::test]
async fn two_consecutive_calls_produce_byte_equal_bodies() {
    let h = test_harness::harness();
    let body = Bytes::from_static(b"stable upstream payload");
    let fetch: Arc<dyn FetchUpstream> = Arc::new(CountingFetch::new(200, "video/mp4", body.clone()));

    let recipe = test_harness::recipe("/videos/stable.mp4");
    let req = test_harness::request("/videos/stable.mp4", "");

    let first = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch.clone()).await;
    let second = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch).await;

    let first_body = test_harness::collect_body(first.body).await;
    let second_body = test_harness::collect_body(second.body).await;
    assert_eq!(first_body, second_body);
    assert_eq!(first_body, body);
}

#[tokio::test]
async fn third_call_after_background_persistence_is_still_byte_equal() {
    let h = test_harness::harness();
    let body = Bytes::from_static(b"stable upstream payload, round three");
    let fetch: Arc<dyn FetchUpstream> = Arc::new(CountingFetch::new(200, "video/mp4", body.clone()));

    let recipe = test_harness::recipe("/videos/stable2.mp4");
    let req = test_harness::request("/videos/stable2.mp4", "");

    let _first = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch.clone()).await;

    let key = videogate::fingerprint::fingerprint(&recipe);
    let store = h.store.clone();
    let landed = test_harness::wait_until(50, std::time::Duration::from_millis(5), || {
        let store = store.clone();
        let key = key.clone();
        async move {
            use videogate::object_store::ChunkedObjectStore;
            store.exists(&key).await.unwrap_or(false)
        }
    })
    .await;
    assert!(landed);

    let third = h.orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch).await;
    assert_eq!(third.headers.get("x-cache-status").unwrap(), "hit-durable");
    let third_body = test_harness::collect_body(third.body).await;
    assert_eq!(third_body, body);
}
