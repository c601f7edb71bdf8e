//! Testable property 2 (spec.md §8): for any body with `S > ChunkThreshold`,
//! `Σ actualChunkSizes = S`, `chunkCount = ⌈S / standardChunkSize⌉`, every
//! chunk but the last is exactly `standardChunkSize`, and the last is in
//! `(0, standardChunkSize]`. Also covers S2 (exact chunk-boundary manifest
//! shape) at a scale a unit test can run without allocating 50 MiB.

use bytes::Bytes;
use futures::StreamExt;

use super::test_harness;
use videogate::object_store::manifest::ObjectMetadata;
use videogate::object_store::ChunkedObjectStore;

fn metadata(content_length: usize) -> ObjectMetadata {
    ObjectMetadata {
        content_type: "video/mp4".to_string(),
        content_length: content_length as u64,
        created_at_ms: videogate::object_store::now_ms(),
        expires_at_ms: 0,
        cache_tags: vec![],
        cache_version: 1,
        recipe_echo: Default::default(),
    }
}

#[tokio::test]
async fn chunk_sizes_sum_to_total_and_match_the_ceiling_formula() {
    // threshold=10, standard_chunk_size=4: a 10-byte body must split into
    // ceil(10/4) = 3 chunks of [4, 4, 2].
    let h = test_harness::harness_with_thresholds(10, 4);
    let body = Bytes::from_static(b"0123456789");
    h.store.put_object("fp-chunked", body.clone(), metadata(body.len())).await.unwrap();

    let (manifest, _metadata) = h.store.get_manifest("fp-chunked").await.unwrap().expect("manifest must exist");
    assert_eq!(manifest.total_size, 10);
    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(manifest.actual_chunk_sizes, vec![4, 4, 2]);
    assert_eq!(manifest.actual_chunk_sizes.iter().sum::<u64>(), 10);
    for size in &manifest.actual_chunk_sizes[..manifest.actual_chunk_sizes.len() - 1] {
        assert_eq!(*size, 4);
    }
    let last = *manifest.actual_chunk_sizes.last().unwrap();
    assert!(last > 0 && last <= 4);
}

#[tokio::test]
async fn full_read_reassembles_the_exact_bytes_across_chunk_boundaries() {
    let h = test_harness::harness_with_thresholds(10, 4);
    let body = Bytes::from(vec![7u8; 37]); // 37 = 9*4 + 1, an odd remainder on purpose
    h.store.put_object("fp-reassembly", body.clone(), metadata(body.len())).await.unwrap();

    let retrieved = h.store.get_object("fp-reassembly").await.unwrap().expect("object must exist");
    match retrieved {
        videogate::object_store::RetrievedObject::Chunked { body: stream, metadata, .. } => {
            assert_eq!(metadata.content_length, 37);
            let collected = test_harness::collect_body(videogate::types::ResponseBody::Stream(Box::pin(
                stream.map(|r| r.map_err(|e| videogate::error::ProxyError::StorageError(e.to_string()))),
            )))
            .await;
            assert_eq!(collected, body);
        }
        videogate::object_store::RetrievedObject::Single { .. } => panic!("expected a chunked object"),
    }
}

#[tokio::test]
async fn body_exactly_at_threshold_is_not_chunked() {
    // spec.md §3: "When the body exceeds ChunkThreshold" — a body of
    // exactly the threshold must be stored as a single value, not chunked.
    let h = test_harness::harness_with_thresholds(16, 4);
    let body = Bytes::from(vec![1u8; 16]);
    h.store.put_object("fp-exact", body.clone(), metadata(body.len())).await.unwrap();

    let retrieved = h.store.get_object("fp-exact").await.unwrap().expect("object must exist");
    assert!(matches!(retrieved, videogate::object_store::RetrievedObject::Single { .. }));
}
