//! Component G: fallback streamer (§4.G).
//!
//! Grounded on the teacher's `request_coalescing::stream::StreamingCoalescer`
//! broadcast-pump idiom, repurposed for a single producer/two-consumer tee
//! instead of one-to-many fan-out, and on `cache::tiered::TieredCache`'s
//! background `tokio::spawn` promotion pattern for the persistence leg.
//!
//! Used when the cache orchestrator must serve an origin response to the
//! client while also durably persisting it, without buffering the whole
//! body before the client sees the first byte and without letting a slow
//! or disconnected client stall the write to the chunked object store.

use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use http::HeaderMap;

use crate::constants::FALLBACK_PUMP_CHANNEL_CAPACITY;
use crate::error::ProxyError;
use crate::object_store::manifest::ObjectMetadata;
use crate::object_store::ChunkedObjectStore;
use crate::types::{GatewayResponse, ResponseBody};

/// An origin response as handed to the fallback streamer: not yet buffered,
/// not yet persisted.
pub struct OriginResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub body: Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>,
}

/// Everything the streamer needs to persist the tee'd body, once it lands.
#[derive(Clone)]
pub struct FallbackContext {
    pub store: std::sync::Arc<dyn ChunkedObjectStore>,
    pub fp: String,
    pub metadata: ObjectMetadata,
    pub hard_skip_threshold_bytes: u64,
}

/// What actually happened to the origin body, for the orchestrator's
/// metrics (`increment_fallback_invocation`/`_hard_skip`/`_persist_failure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// `Content-Length` exceeded the hard skip threshold — served untouched,
    /// no persistence attempted at all.
    HardSkipped,
    /// Body teed to the client; a background task is persisting it.
    Persisting,
}

/// Tee `origin`'s body to the client and, unless it's over the hard skip
/// threshold, to a background task that persists it via
/// `ChunkedObjectStore::put_object`. The client-facing stream is returned
/// immediately; persistence failures are logged but never surface to the
/// client, since the client already has (or is getting) its bytes.
pub fn serve_with_fallback(origin: OriginResponse, ctx: FallbackContext) -> (GatewayResponse, FallbackOutcome) {
    let over_threshold = origin
        .content_length
        .map(|len| len > ctx.hard_skip_threshold_bytes)
        .unwrap_or(false);

    if over_threshold {
        return (
            GatewayResponse::new(origin.status, origin.headers, ResponseBody::Stream(origin.body)),
            FallbackOutcome::HardSkipped,
        );
    }

    let (client_tx, client_rx) = tokio::sync::mpsc::channel::<Result<Bytes, ProxyError>>(FALLBACK_PUMP_CHANNEL_CAPACITY);

    let status = origin.status;
    let headers = origin.headers;
    let mut body = origin.body;

    tokio::spawn(async move {
        let mut accumulated = BytesMut::new();
        let mut upstream_failed = false;

        while let Some(item) = body.next().await {
            match item {
                Ok(chunk) => {
                    accumulated.extend_from_slice(&chunk);
                    // A dropped receiver means the client disconnected; keep
                    // draining the origin body so persistence still completes.
                    let _ = client_tx.send(Ok(chunk)).await;
                }
                Err(e) => {
                    upstream_failed = true;
                    let _ = client_tx.send(Err(e)).await;
                    break;
                }
            }
        }
        drop(client_tx);

        if upstream_failed {
            return;
        }

        let body_bytes = accumulated.freeze();
        if let Err(e) = ctx.store.put_object(&ctx.fp, body_bytes, ctx.metadata).await {
            tracing::warn!(fp = %ctx.fp, error = %e, "fallback background persistence failed");
        }
    });

    let stream = futures::stream::unfold(client_rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });

    (
        GatewayResponse::new(status, headers, ResponseBody::Stream(Box::pin(stream))),
        FallbackOutcome::Persisting,
    )
}
