//! Testable properties 3 and 4 (spec.md §8): a valid `Range: bytes=a-b`
//! serves 206 with the exact slice, correct `Content-Length`/`Content-Range`;
//! an out-of-bounds or malformed range serves 416 (never a misleading 206).
//! Also covers S3 (range read across a chunk boundary) at a scale a test
//! can assert byte-for-byte.

use bytes::Bytes;

use super::test_harness;
use videogate::object_store::manifest::ObjectMetadata;
use videogate::object_store::ChunkedObjectStore;

fn metadata(content_type: &str, content_length: usize) -> ObjectMetadata {
    ObjectMetadata {
        content_type: content_type.to_string(),
        content_length: content_length as u64,
        created_at_ms: videogate::object_store::now_ms(),
        expires_at_ms: 0,
        cache_tags: vec![],
        cache_version: 1,
        recipe_echo: Default::default(),
    }
}

#[tokio::test]
async fn valid_range_on_a_single_value_object_serves_206_with_the_exact_slice() {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/a.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);
    let body = Bytes::from_static(b"abcdefghijklmnopqrstuvwxyz"); // 26 bytes
    h.store.put_object(&key, body.clone(), metadata("video/mp4", body.len())).await.unwrap();

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::range_request("/videos/a.mp4", "bytes=5-10"), &recipe, test_harness::ORIGIN, unreachable_fetch())
        .await;

    assert_eq!(resp.status, 206);
    assert_eq!(resp.headers.get(http::header::CONTENT_LENGTH).unwrap(), "6");
    assert_eq!(resp.headers.get(http::header::CONTENT_RANGE).unwrap(), "bytes 5-10/26");
    let collected = test_harness::collect_body(resp.body).await;
    assert_eq!(collected, Bytes::from_static(b"fghijk"));
}

#[tokio::test]
async fn out_of_bounds_range_on_a_single_value_object_serves_416_never_206() {
    let h = test_harness::harness();
    let recipe = test_harness::recipe("/videos/a.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);
    let body = Bytes::from_static(b"abcdefghijklmnopqrstuvwxyz");
    h.store.put_object(&key, body.clone(), metadata("video/mp4", body.len())).await.unwrap();

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::range_request("/videos/a.mp4", "bytes=1000-2000"), &recipe, test_harness::ORIGIN, unreachable_fetch())
        .await;

    assert_eq!(resp.status, 416);
    assert_ne!(resp.status, 206);
}

#[tokio::test]
async fn range_crossing_a_chunk_boundary_reassembles_from_both_chunks() {
    // threshold=10, standard_chunk_size=10: a 25-byte body chunks as
    // [10, 10, 5]; bytes=8-12 spans chunk 0's tail and chunk 1's head.
    let h = test_harness::harness_with_thresholds(10, 10);
    let recipe = test_harness::recipe("/videos/a.mp4");
    let key = videogate::fingerprint::fingerprint(&recipe);
    let body = Bytes::from_static(b"ABCDEFGHIJKLMNOPQRSTUVWXY"); // 25 bytes, A..Y
    h.store.put_object(&key, body.clone(), metadata("video/mp4", body.len())).await.unwrap();

    let resp = h
        .orchestrator
        .serve_cached(&test_harness::range_request("/videos/a.mp4", "bytes=8-12"), &recipe, test_harness::ORIGIN, unreachable_fetch())
        .await;

    assert_eq!(resp.status, 206);
    assert_eq!(resp.headers.get(http::header::CONTENT_LENGTH).unwrap(), "5");
    assert_eq!(resp.headers.get(http::header::CONTENT_RANGE).unwrap(), "bytes 8-12/25");
    let collected = test_harness::collect_body(resp.body).await;
    assert_eq!(collected, Bytes::from_static(b"IJKLM"));
}

/// A `FetchUpstream` that panics if called — these tests exercise a
/// pre-populated durable hit and must never reach the upstream.
fn unreachable_fetch() -> std::sync::Arc<dyn videogate::upstream::FetchUpstream> {
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl videogate::upstream::FetchUpstream for Unreachable {
        async fn fetch(&self, _req: videogate::upstream::UpstreamRequest) -> Result<videogate::upstream::UpstreamResponse, videogate::error::ProxyError> {
            panic!("a durable-tier range hit must not call fetchUpstream");
        }

        async fn fetch_stream(&self, _req: videogate::upstream::UpstreamRequest) -> Result<videogate::upstream::UpstreamStreamResponse, videogate::error::ProxyError> {
            panic!("a durable-tier range hit must not call fetchUpstream");
        }
    }

    std::sync::Arc::new(Unreachable)
}
