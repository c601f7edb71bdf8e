//! Component C: chunked object store (§4.C, §3 "Stored Value").
//!
//! Grounded on the teacher's `cache::disk::*` (index + backend split) and
//! `cache::redis::*` (`ConnectionManager`-backed KV client, msgpack wire
//! format), plus the chunked-store shape from
//! `other_examples/stackhpc-reductionist-rs/chunk_store.rs` and
//! `other_examples/winnyboy5-mediagit-core/chunking.rs`.
//!
//! Values at or above `chunk_threshold_bytes` are split into fixed-size
//! chunks, each stored under its own KV key, with a manifest written last so
//! a reader never observes a partially-written chunked object as present.

pub mod chunk_lock;
pub mod manifest;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};

use crate::constants::{CHUNK_INTEGRITY_DRIFT_FRACTION, CHUNK_INTEGRITY_MIN_DRIFT_BYTES};
use chunk_lock::ChunkLockTable;
use manifest::{Manifest, ObjectMetadata};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("durable tier error: {0}")]
    Storage(String),
    #[error("object exceeds max chunk count")]
    TooManyChunks,
    #[error("another writer currently holds the chunk lock for this key")]
    Locked,
    #[error("chunk integrity check failed: {0}")]
    Integrity(String),
    #[error("wire encode/decode failed: {0}")]
    Wire(String),
}

impl From<manifest::WireError> for StoreError {
    fn from(e: manifest::WireError) -> Self {
        StoreError::Wire(e.to_string())
    }
}

/// Raw key-value primitive underneath the object store: one write, one
/// read, one delete, no notion of chunking. Equivalent to the teacher's
/// `cache::traits::Cache` trait, narrowed to what `ChunkedObjectStore` needs.
#[async_trait]
pub trait DurableKv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process test double, also viable for single-instance deployments.
#[derive(Default)]
pub struct InMemoryKv {
    data: AsyncMutex<HashMap<String, Bytes>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableKv for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().await.remove(key);
        Ok(())
    }
}

/// Redis-backed durable tier, same connection shape as the teacher's
/// `cache::redis::RedisCache` (`ConnectionManager`, multiplexed, cloned per
/// call rather than pooled).
pub struct RedisKv {
    connection: ConnectionManager,
}

impl RedisKv {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DurableKv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<Vec<u8>> = conn.get(key).await.map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(raw.map(Bytes::from))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set(key, value.to_vec())
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(key).await.map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// What a successful `get_object` returns: either the value in full, or a
/// manifest plus a stream walking its chunks in order. Range reads bypass
/// the stream and call `get_chunk` directly against the manifest.
pub enum RetrievedObject {
    Single {
        bytes: Bytes,
        metadata: ObjectMetadata,
    },
    Chunked {
        manifest: Manifest,
        metadata: ObjectMetadata,
        body: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>,
    },
}

#[async_trait]
pub trait ChunkedObjectStore: Send + Sync {
    async fn put_object(&self, fp: &str, body: Bytes, metadata: ObjectMetadata) -> Result<(), StoreError>;
    async fn get_object(&self, fp: &str) -> Result<Option<RetrievedObject>, StoreError>;
    async fn get_manifest(&self, fp: &str) -> Result<Option<(Manifest, ObjectMetadata)>, StoreError>;
    async fn get_chunk(&self, fp: &str, manifest: &Manifest, index: usize) -> Result<Bytes, StoreError>;
    async fn exists(&self, fp: &str) -> Result<bool, StoreError>;
    fn chunk_key(&self, fp: &str, index: u32) -> String {
        crate::fingerprint::chunk_key(fp, index)
    }
}

/// Default implementation over any `DurableKv`, parameterized by the
/// threshold/chunk-size/max-chunks/parallelism knobs from `config::cache`.
pub struct KvChunkedObjectStore {
    kv: Arc<dyn DurableKv>,
    locks: Arc<ChunkLockTable>,
    write_permits: Arc<Semaphore>,
    chunk_threshold_bytes: u64,
    standard_chunk_size_bytes: u64,
    max_chunks: u32,
}

impl KvChunkedObjectStore {
    pub fn new(
        kv: Arc<dyn DurableKv>,
        chunk_threshold_bytes: u64,
        standard_chunk_size_bytes: u64,
        max_chunks: u32,
        parallel_chunk_writes: usize,
    ) -> Self {
        Self {
            kv,
            locks: Arc::new(ChunkLockTable::new()),
            write_permits: Arc::new(Semaphore::new(parallel_chunk_writes.max(1))),
            chunk_threshold_bytes,
            standard_chunk_size_bytes,
            max_chunks,
        }
    }

    pub fn lock_table(&self) -> Arc<ChunkLockTable> {
        self.locks.clone()
    }

    async fn put_single(&self, fp: &str, body: Bytes, metadata: ObjectMetadata) -> Result<(), StoreError> {
        let encoded = manifest::encode_single(&body, &metadata)?;
        self.kv.put(fp, Bytes::from(encoded)).await
    }

    async fn put_chunked(&self, fp: &str, body: Bytes, metadata: ObjectMetadata) -> Result<(), StoreError> {
        let chunk_size = self.standard_chunk_size_bytes;
        let chunks: Vec<Bytes> = body
            .chunks(chunk_size as usize)
            .map(|c| Bytes::copy_from_slice(c))
            .collect();

        if chunks.len() as u32 > self.max_chunks {
            return Err(StoreError::TooManyChunks);
        }

        let now = std::time::Instant::now();
        let _guard = self.locks.try_acquire(fp, now).ok_or(StoreError::Locked)?;

        let write_result = {
            let futures = chunks.iter().enumerate().map(|(i, chunk)| {
                let kv = self.kv.clone();
                let permits = self.write_permits.clone();
                let chunk = chunk.clone();
                let key = self.chunk_key(fp, i as u32);
                async move {
                    let _permit = permits.acquire().await.expect("semaphore closed");
                    kv.put(&key, chunk).await
                }
            });
            futures::future::join_all(futures).await
        };

        if let Some(err) = write_result.into_iter().find_map(|r| r.err()) {
            self.cleanup_partial_chunks(fp, chunks.len()).await;
            self.locks.release(_guard);
            return Err(err);
        }

        let actual_sizes: Vec<u64> = chunks.iter().map(|c| c.len() as u64).collect();
        let manifest_value = Manifest::new(
            body.len() as u64,
            chunk_size,
            actual_sizes,
            metadata.content_type.clone(),
        );

        let encoded = match manifest::encode_manifest(&manifest_value, &metadata) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.cleanup_partial_chunks(fp, chunks.len()).await;
                self.locks.release(_guard);
                return Err(e.into());
            }
        };

        let result = self.kv.put(fp, Bytes::from(encoded)).await;
        self.locks.release(_guard);

        if result.is_err() {
            self.cleanup_partial_chunks(fp, chunks.len()).await;
        }
        result
    }

    /// Best-effort deletion of already-written chunks after a failed write.
    /// Errors here are logged, never propagated (§8 property 10).
    async fn cleanup_partial_chunks(&self, fp: &str, count: usize) {
        for i in 0..count {
            let key = self.chunk_key(fp, i as u32);
            if let Err(e) = self.kv.delete(&key).await {
                tracing::warn!(chunk = %key, error = %e, "failed to clean up partial chunk write");
            }
        }
    }

    fn check_drift(expected: u64, actual: u64) -> Result<(), StoreError> {
        let drift = expected.abs_diff(actual);
        let tolerance = ((expected as f64) * CHUNK_INTEGRITY_DRIFT_FRACTION) as u64;
        let allowed = tolerance.max(CHUNK_INTEGRITY_MIN_DRIFT_BYTES);
        if drift > allowed {
            return Err(StoreError::Integrity(format!(
                "expected {} bytes, got {} (drift {} exceeds {})",
                expected, actual, drift, allowed
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkedObjectStore for KvChunkedObjectStore {
    async fn put_object(&self, fp: &str, body: Bytes, metadata: ObjectMetadata) -> Result<(), StoreError> {
        if (body.len() as u64) > self.chunk_threshold_bytes {
            self.put_chunked(fp, body, metadata).await
        } else {
            self.put_single(fp, body, metadata).await
        }
    }

    async fn get_manifest(&self, fp: &str) -> Result<Option<(Manifest, ObjectMetadata)>, StoreError> {
        let Some(raw) = self.kv.get(fp).await? else {
            return Ok(None);
        };
        // A single-value object decodes as WireSingle, not WireManifest; the
        // caller distinguishes via get_object. Here we only ever expect
        // manifests, so decode failure means it wasn't chunked.
        match manifest::decode_manifest(&raw) {
            Ok((m, meta)) => Ok(Some((m, meta))),
            Err(_) => Ok(None),
        }
    }

    async fn get_chunk(&self, fp: &str, manifest: &Manifest, index: usize) -> Result<Bytes, StoreError> {
        let key = self.chunk_key(fp, index as u32);
        let chunk = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::Integrity(format!("missing chunk {}", index)))?;
        let expected = manifest.actual_chunk_sizes[index];
        Self::check_drift(expected, chunk.len() as u64)?;
        Ok(chunk)
    }

    async fn get_object(&self, fp: &str) -> Result<Option<RetrievedObject>, StoreError> {
        let Some(raw) = self.kv.get(fp).await? else {
            return Ok(None);
        };

        if let Ok((manifest_value, metadata)) = manifest::decode_manifest(&raw) {
            // An expired manifest is treated exactly like a miss (§3
            // Lifecycle): the caller falls through to upstream and the
            // stale chunks become unreferenced until their own TTL lapses.
            if metadata.is_expired(now_ms()) {
                return Ok(None);
            }
            let kv = self.kv.clone();
            let fp_owned = fp.to_string();
            let chunk_count = manifest_value.chunk_count as usize;
            let manifest_for_stream = manifest_value.clone();
            let body = stream::unfold(0usize, move |index| {
                let kv = kv.clone();
                let fp_owned = fp_owned.clone();
                let manifest_for_stream = manifest_for_stream.clone();
                async move {
                    if index >= chunk_count {
                        return None;
                    }
                    let key = crate::fingerprint::chunk_key(&fp_owned, index as u32);
                    let result = match kv.get(&key).await {
                        Ok(Some(chunk)) => {
                            let expected = manifest_for_stream.actual_chunk_sizes[index];
                            match KvChunkedObjectStore::check_drift(expected, chunk.len() as u64) {
                                Ok(()) => Ok(chunk),
                                Err(e) => Err(e),
                            }
                        }
                        Ok(None) => Err(StoreError::Integrity(format!("missing chunk {}", index))),
                        Err(e) => Err(e),
                    };
                    Some((result, index + 1))
                }
            });

            return Ok(Some(RetrievedObject::Chunked {
                manifest: manifest_value,
                metadata,
                body: Box::pin(body),
            }));
        }

        let (bytes, metadata) = manifest::decode_single(&raw)?;
        if metadata.is_expired(now_ms()) {
            return Ok(None);
        }
        Ok(Some(RetrievedObject::Single { bytes, metadata }))
    }

    async fn exists(&self, fp: &str) -> Result<bool, StoreError> {
        Ok(self.kv.get(fp).await?.is_some())
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
