//! Component B: version store (§4.B).
//!
//! Backed by the durable tier's client but a distinct key namespace
//! (`version-<fp>`) so TTL expiry of variants never loses version state
//! (§9). Mirrors the teacher's `cache::traits::Cache` trait-object split
//! between an in-memory test double and a Redis-backed implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub enum VersionError {
    Storage(String),
    Serialization(String),
}

impl std::fmt::Display for VersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionError::Storage(msg) => write!(f, "version store error: {}", msg),
            VersionError::Serialization(msg) => write!(f, "version serialization error: {}", msg),
        }
    }
}

impl std::error::Error for VersionError {}

/// Metadata-only record (§3: "Stored Value"). The durable value itself is
/// always empty `Bytes`; version bookkeeping lives entirely in this struct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl VersionRecord {
    fn initial(now_ms: i64) -> Self {
        Self {
            version: 1,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Current version for `key`, or 1 if no record exists yet (§4.B).
    async fn get_version(&self, key: &str) -> Result<u32, VersionError>;

    /// Idempotent bump: `stored = max(stored, my_next)` (§9). `force=false`
    /// is a no-op when a version already exists; `force=true` always bumps
    /// (used by cache-miss and explicit bust triggers).
    async fn bump_version(&self, key: &str, force: bool, now_ms: i64) -> Result<u32, VersionError>;

    /// Overwrite the stored version directly (used after a background bump
    /// completes, mirroring the teacher's "continue after response" writes).
    async fn put_version(&self, key: &str, version: u32, now_ms: i64) -> Result<(), VersionError>;
}

/// Process-local test double, also usable as the version store in
/// single-process deployments. Equivalent in spirit to the teacher's
/// `MemoryCache`.
#[derive(Default)]
pub struct InMemoryVersionStore {
    records: Mutex<HashMap<String, VersionRecord>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get_version(&self, key: &str) -> Result<u32, VersionError> {
        let records = self.records.lock().map_err(|_| VersionError::Storage("poisoned lock".into()))?;
        Ok(records.get(key).map(|r| r.version).unwrap_or(1))
    }

    async fn bump_version(&self, key: &str, force: bool, now_ms: i64) -> Result<u32, VersionError> {
        let mut records = self.records.lock().map_err(|_| VersionError::Storage("poisoned lock".into()))?;
        match records.get_mut(key) {
            Some(existing) if !force => Ok(existing.version),
            Some(existing) => {
                let candidate = existing.version + 1;
                existing.version = existing.version.max(candidate);
                existing.updated_at_ms = now_ms;
                Ok(existing.version)
            }
            None => {
                let record = VersionRecord::initial(now_ms);
                let bumped = if force { record.version + 1 } else { record.version };
                records.insert(
                    key.to_string(),
                    VersionRecord {
                        version: bumped,
                        ..record
                    },
                );
                Ok(bumped)
            }
        }
    }

    async fn put_version(&self, key: &str, version: u32, now_ms: i64) -> Result<(), VersionError> {
        let mut records = self.records.lock().map_err(|_| VersionError::Storage("poisoned lock".into()))?;
        let entry = records.entry(key.to_string()).or_insert_with(|| VersionRecord::initial(now_ms));
        entry.version = entry.version.max(version);
        entry.updated_at_ms = now_ms;
        Ok(())
    }
}

/// Redis-backed implementation: each key lives under its own namespace
/// prefix (`version-<fp>`, already applied by callers via
/// `fingerprint::version_key`), value msgpack-encoded `VersionRecord`,
/// multiplexed through `ConnectionManager` the same way
/// `cache::redis::RedisCache` does.
pub struct RedisVersionStore {
    connection: ConnectionManager,
}

impl RedisVersionStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    async fn read(&self, key: &str) -> Result<Option<VersionRecord>, VersionError> {
        let mut conn = self.connection.clone();
        let raw: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| VersionError::Storage(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(bytes) => rmp_serde::from_slice(&bytes)
                .map(Some)
                .map_err(|e| VersionError::Serialization(e.to_string())),
        }
    }

    async fn write(&self, key: &str, record: VersionRecord) -> Result<(), VersionError> {
        let mut conn = self.connection.clone();
        let bytes = rmp_serde::to_vec(&record).map_err(|e| VersionError::Serialization(e.to_string()))?;
        let _: () = conn
            .set(key, bytes)
            .await
            .map_err(|e| VersionError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VersionStore for RedisVersionStore {
    async fn get_version(&self, key: &str) -> Result<u32, VersionError> {
        Ok(self.read(key).await?.map(|r| r.version).unwrap_or(1))
    }

    async fn bump_version(&self, key: &str, force: bool, now_ms: i64) -> Result<u32, VersionError> {
        match self.read(key).await? {
            Some(existing) if !force => Ok(existing.version),
            Some(existing) => {
                let candidate = existing.version + 1;
                let bumped = existing.version.max(candidate);
                self.write(
                    key,
                    VersionRecord {
                        version: bumped,
                        updated_at_ms: now_ms,
                        ..existing
                    },
                )
                .await?;
                Ok(bumped)
            }
            None => {
                let record = VersionRecord::initial(now_ms);
                let bumped = if force { record.version + 1 } else { record.version };
                self.write(
                    key,
                    VersionRecord {
                        version: bumped,
                        ..record
                    },
                )
                .await?;
                Ok(bumped)
            }
        }
    }

    async fn put_version(&self, key: &str, version: u32, now_ms: i64) -> Result<(), VersionError> {
        let mut record = self.read(key).await?.unwrap_or_else(|| VersionRecord::initial(now_ms));
        record.version = record.version.max(version);
        record.updated_at_ms = now_ms;
        self.write(key, record).await
    }
}

fn _assert_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<InMemoryVersionStore>();
    assert_sync::<InMemoryVersionStore>();
    assert_send::<RedisVersionStore>();
    assert_sync::<RedisVersionStore>();
}
