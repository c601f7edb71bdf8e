//! Component F: single-flight coalescer (§4.F).
//!
//! Grounded on the teacher's `request_coalescing::RequestCoalescer`
//! (leader/follower map, `Drop`-based cleanup via a spawned detach task)
//! generalized with the value-carrying broadcast idiom from
//! `request_coalescing::stream::StreamingCoalescer` — here the in-flight
//! entry carries the *resolved* response body rather than a completion
//! signal, so a follower never needs a second round-trip to a tier that may
//! not have committed yet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::HeaderMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ProxyError;

/// The fully-resolved response a leader hands to its followers. Always the
/// *full* body — if the triggering request carried a `Range` header, the
/// caller must strip it before invoking the coalesced handler; range
/// slicing happens afterwards, at serve time, against the now-cached object.
#[derive(Debug, Clone)]
pub struct CoalescedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type CoalescedResult = Result<CoalescedResponse, ProxyError>;

/// Which role a caller played in a `do_coalesced` call, so the orchestrator
/// can drive its own leader/follower metrics without this module reaching
/// into `metrics` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceRole {
    Leader,
    Follower,
}

struct InFlight {
    tx: broadcast::Sender<CoalescedResult>,
    ref_count: Arc<AtomicUsize>,
    #[allow(dead_code)]
    request_id: Uuid,
    #[allow(dead_code)]
    created_at: Instant,
}

/// Single-flight entry-point: deduplicates concurrent callers for the same
/// fingerprint so only one of them actually runs `handler`.
#[derive(Clone)]
pub struct Coalescer {
    in_flight: Arc<tokio::sync::Mutex<HashMap<String, InFlight>>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Run `handler` at most once per `fingerprint` among concurrent
    /// callers. The first caller for a given key becomes the leader and
    /// actually invokes `handler`; every other concurrent caller subscribes
    /// to the leader's broadcast and receives an independent clone of the
    /// resolved result (or its error) once the leader settles.
    pub async fn do_coalesced<F, Fut>(&self, fingerprint: &str, handler: F) -> (CoalesceRole, CoalescedResult)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CoalescedResult>,
    {
        let mut table = self.in_flight.lock().await;
        if let Some(entry) = table.get(fingerprint) {
            entry.ref_count.fetch_add(1, Ordering::SeqCst);
            let mut rx = entry.tx.subscribe();
            drop(table);
            let result = match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(ProxyError::Internal(
                    "coalescing leader settled without a result".to_string(),
                )),
            };
            return (CoalesceRole::Follower, result);
        }

        let (tx, _rx) = broadcast::channel(1);
        table.insert(
            fingerprint.to_string(),
            InFlight {
                tx: tx.clone(),
                ref_count: Arc::new(AtomicUsize::new(1)),
                request_id: Uuid::new_v4(),
                created_at: Instant::now(),
            },
        );
        drop(table);

        // Detach-cleanup guard: removes the entry once the leader settles,
        // whether `handler` returns normally or panics.
        let guard = LeaderGuard {
            key: fingerprint.to_string(),
            coalescer: self.clone(),
        };

        let result = handler().await;
        // Ignore send errors: no followers subscribed is not a failure.
        let _ = tx.send(result.clone());
        drop(guard);

        (CoalesceRole::Leader, result)
    }
}

impl Default for Coalescer {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the leader for the duration of `handler`. `Drop` can't be async,
/// so cleanup is handed off to a spawned task exactly like the teacher's
/// `LeaderGuard` hands its `remove_in_flight` call to the async `Mutex`.
struct LeaderGuard {
    key: String,
    coalescer: Coalescer,
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        let key = std::mem::take(&mut self.key);
        let coalescer = self.coalescer.clone();
        tokio::spawn(async move {
            let mut table = coalescer.in_flight.lock().await;
            table.remove(&key);
        });
    }
}
