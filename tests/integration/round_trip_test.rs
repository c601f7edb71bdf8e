//! Testable property 1 (spec.md §8): `put(fp(R), B); get(fp(R))` returns
//! bytes equal to B and content-type equal to the stored content-type, for
//! any body at or under `MaxSupported`. Driven through `ServeCached` end to
//! end (miss populates the durable tier, the second request reads it back)
//! rather than calling the object store directly, so the assertion covers
//! the whole path the spec actually describes.

use std::sync::Arc;

use bytes::Bytes;

use super::test_harness::{self, CountingFetch};
use videogate::upstream::FetchUpstream;

#[tokio::test]
async fn round_trip_returns_the_same_bytes_and_content_type() {
    let h = test_harness::harness();
    let body = Bytes::from_static(b"fake mp4 bytes, round tripped");
    let fetch: Arc<dyn FetchUpstream> = Arc::new(CountingFetch::new(200, "video/mp4", body.clone()));

    let first = h
        .orchestrator
        .serve_cached(
            &test_harness::request("/videos/a.mp4", ""),
            &test_harness::recipe("/videos/a.mp4"),
            test_harness::ORIGIN,
            fetch.clone(),
        )
        .await;
    assert_eq!(first.status, 200);
    let first_body = test_harness::collect_body(first.body).await;
    assert_eq!(first_body, body);
    assert_eq!(first.headers.get(http::header::CONTENT_TYPE).map(|v| v.to_str().unwrap()), Some("video/mp4"));

    let landed = test_harness::wait_until(50, std::time::Duration::from_millis(5), || {
        let store = h.store.clone();
        async move {
            use videogate::object_store::ChunkedObjectStore;
            let key = videogate::fingerprint::fingerprint(&test_harness::recipe("/videos/a.mp4"));
            store.exists(&key).await.unwrap_or(false)
        }
    })
    .await;
    assert!(landed, "durable put never landed");

    let second = h
        .orchestrator
        .serve_cached(
            &test_harness::request("/videos/a.mp4", ""),
            &test_harness::recipe("/videos/a.mp4"),
            test_harness::ORIGIN,
            fetch,
        )
        .await;
    assert_eq!(second.status, 200);
    let second_body = test_harness::collect_body(second.body).await;
    assert_eq!(second_body, body, "round-trip must preserve bytes exactly");
    assert_eq!(second.headers.get("x-cache-status").unwrap(), "hit-durable");
}
