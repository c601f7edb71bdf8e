//! Testable property 6 and scenario S4 (spec.md §8): N concurrent requests
//! for the same fingerprint, starting within the window before any
//! completes, must invoke `fetchUpstream` exactly once; every response body
//! must be byte-equal and independently readable.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::upstream::FetchUpstream;

const CONCURRENT_CALLERS: usize = 100;

#[tokio::test]
async fn concurrent_requests_for_the_same_fingerprint_call_upstream_once() {
    let h = test_harness::harness();
    let body = Bytes::from_static(b"single-flight payload, identical for every waiter");
    let fetch = Arc::new(CountingFetch::with_delay(200, "video/mp4", body.clone(), Duration::from_millis(80)));
    let fetch_dyn: Arc<dyn FetchUpstream> = fetch.clone();

    let recipe = test_harness::recipe("/videos/hot.mp4");

    let mut handles = Vec::with_capacity(CONCURRENT_CALLERS);
    for _ in 0..CONCURRENT_CALLERS {
        let orchestrator = h.orchestrator.clone();
        let recipe = recipe.clone();
        let fetch_dyn = fetch_dyn.clone();
        handles.push(tokio::spawn(async move {
            let req = test_harness::request("/videos/hot.mp4", "");
            let resp = orchestrator.serve_cached(&req, &recipe, test_harness::ORIGIN, fetch_dyn).await;
            test_harness::collect_body(resp.body).await
        }));
    }

    let mut bodies = Vec::with_capacity(CONCURRENT_CALLERS);
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert_eq!(fetch.call_count(), 1, "all concurrent callers should have been coalesced into a single upstream fetch");
    for b in &bodies {
        assert_eq!(*b, body, "every waiter must see the leader's exact body");
    }
}
