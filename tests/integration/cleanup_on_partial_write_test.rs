//! Testable property 10 (spec.md §8): if chunk `i`'s write fails, the
//! manifest must never be written, and cleanup must best-effort remove the
//! chunks that did land so a reader never sees a partially-written object.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use videogate::object_store::manifest::ObjectMetadata;
use videogate::object_store::{ChunkedObjectStore, DurableKv, InMemoryKv, KvChunkedObjectStore, StoreError};

/// Wraps a real `InMemoryKv` but fails every `put` whose key matches
/// `failing_key`, so a chunked write can be made to fail partway through
/// deterministically.
struct FailOnKeyKv {
    inner: InMemoryKv,
    failing_key: String,
}

#[async_trait]
impl DurableKv for FailOnKeyKv {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        if key == self.failing_key {
            return Err(StoreError::Storage("simulated write failure".to_string()));
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

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
async fn failed_chunk_write_leaves_no_manifest_and_no_stray_chunks() {
    let fp = "fp-partial-write";
    // threshold=10, standard_chunk_size=4: a 10-byte body writes chunks
    // 0,1,2 (sizes 4,4,2); make chunk 1's write fail.
    let chunk_1_key = videogate::fingerprint::chunk_key(fp, 1);
    let kv: Arc<dyn DurableKv> = Arc::new(FailOnKeyKv {
        inner: InMemoryKv::new(),
        failing_key: chunk_1_key.clone(),
    });
    let store = KvChunkedObjectStore::new(kv, 10, 4, 1000, 4);

    let body = Bytes::from_static(b"0123456789");
    let result = store.put_object(fp, body.clone(), metadata(body.len())).await;
    assert!(result.is_err(), "a chunk write failure must surface as an error, not a silent partial success");

    assert!(!store.exists(fp).await.unwrap(), "the manifest must never be written when a chunk write fails");

    for i in 0..3 {
        let key = videogate::fingerprint::chunk_key(fp, i);
        assert!(!store.exists(&key).await.unwrap_or(false), "chunk {i} must be cleaned up after a partial write failure");
    }
}
