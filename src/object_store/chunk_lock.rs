//! Per-chunk write locking (§4.C, §9 "Chunk locking").
//!
//! Same shape as the teacher's `cache::disk::index::CacheIndex` in-memory
//! index, but guarding exclusive writers by key instead of tracking sizes:
//! a `Mutex<HashMap<String, ChunkLock>>` carrying a monotonic token per
//! entry, reclaimed by an idle sweeper rather than relying on `Drop` alone,
//! since a panicked or killed writer must not wedge the key forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::constants::CHUNK_LOCK_MAX_HOLD_SECS;

#[derive(Debug, Clone, Copy)]
struct ChunkLock {
    token: u64,
    acquired_at: Instant,
}

/// Guards concurrent writers from racing on the same object key while a
/// multi-chunk `put_object` is in progress.
pub struct ChunkLockTable {
    locks: Mutex<HashMap<String, ChunkLock>>,
    next_token: AtomicU64,
    max_hold: Duration,
}

/// Held by the writer that currently owns the lock; dropping it without
/// calling `release` leaves the entry for the sweeper to reclaim once
/// `max_hold` elapses.
pub struct LockGuard {
    key: String,
    token: u64,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ChunkLockTable {
    pub fn new() -> Self {
        Self::with_max_hold(Duration::from_secs(CHUNK_LOCK_MAX_HOLD_SECS))
    }

    pub fn with_max_hold(max_hold: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            max_hold,
        }
    }

    /// Attempt to acquire the lock for `key`. Returns `None` if another
    /// writer currently holds it and its hold hasn't expired.
    pub fn try_acquire(&self, key: &str, now: Instant) -> Option<LockGuard> {
        let mut locks = self.locks.lock().expect("chunk lock table poisoned");
        if let Some(existing) = locks.get(key) {
            if now.duration_since(existing.acquired_at) < self.max_hold {
                return None;
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        locks.insert(
            key.to_string(),
            ChunkLock {
                token,
                acquired_at: now,
            },
        );
        Some(LockGuard {
            key: key.to_string(),
            token,
        })
    }

    /// Release the lock, but only if `guard` still holds the current token
    /// (it may have been reclaimed by the sweeper and handed to a new
    /// writer already).
    pub fn release(&self, guard: LockGuard) {
        let mut locks = self.locks.lock().expect("chunk lock table poisoned");
        if let Some(existing) = locks.get(&guard.key) {
            if existing.token == guard.token {
                locks.remove(&guard.key);
            }
        }
    }

    /// Reclaim any lock held longer than `max_hold`. Runs on an idle
    /// `tokio::time::interval` loop (§9).
    pub fn sweep(&self, now: Instant) -> usize {
        let mut locks = self.locks.lock().expect("chunk lock table poisoned");
        let before = locks.len();
        locks.retain(|_, lock| now.duration_since(lock.acquired_at) < self.max_hold);
        before - locks.len()
    }

    pub fn held_count(&self) -> usize {
        self.locks.lock().expect("chunk lock table poisoned").len()
    }
}

impl Default for ChunkLockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `table.sweep()` on a fixed interval until the returned handle is
/// dropped. Mirrors the teacher's habit of spawning small, single-purpose
/// background loops (coalescer cleanup, cache promotion) rather than one
/// monolithic janitor task.
pub fn spawn_sweeper(table: std::sync::Arc<ChunkLockTable>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            table.sweep(Instant::now());
        }
    })
}
