//! Shared request/response shapes passed between the recipe parser, the
//! cache orchestrator, and the Pingora proxy glue.
//!
//! The core (fingerprint/version/object_store/range/edge_cache/coalescing/
//! fallback/orchestrator) never touches `pingora_http::Session` directly —
//! it takes and returns these plain types, the same separation the teacher
//! draws in `proxy::cache_handler` between result enums and the functions
//! that finally write to the session.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use http::HeaderMap;

use crate::error::ProxyError;

/// Inbound request, reduced to what the cache path needs.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: http::Method,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
}

impl GatewayRequest {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response body, either fully buffered or a lazy byte stream.
///
/// `Full` is used for cache hits and small upstream responses; `Stream` is
/// used for the fallback streamer's tee pump and ranged reads over chunked
/// objects, where buffering the whole body would defeat the point.
pub enum ResponseBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }

    pub fn is_full(&self) -> bool {
        matches!(self, ResponseBody::Full(_))
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Full(b) => write!(f, "ResponseBody::Full({} bytes)", b.len()),
            ResponseBody::Stream(_) => write!(f, "ResponseBody::Stream(..)"),
        }
    }
}

/// Outbound response, as produced by the orchestrator before the proxy glue
/// translates it into `pingora_http` primitives.
#[derive(Debug)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl GatewayResponse {
    pub fn new(status: u16, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            ResponseBody::Full(b) => Some(b.len() as u64),
            ResponseBody::Stream(_) => self
                .headers
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
