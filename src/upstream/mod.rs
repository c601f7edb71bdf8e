//! Upstream / FetchUpstream collaborator (§10).
//!
//! The direct analog of the teacher's S3 GET client (`s3::mod` +
//! `proxy::upstream`), generalized from an AWS SDK call to a plain HTTP
//! request against a transformer RPC endpoint — hence dropping the
//! `aws-sdk-s3` dependency (see DESIGN.md trim note).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use http::{HeaderMap, Method};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::ProxyError;

/// A request to the upstream transformer RPC (or, for the streaming variant,
/// directly to the origin source).
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Fully-qualified URL, already including the `?v=<n>` rewrite when a
    /// cache-busting version bump applies (§4.B effect).
    pub url: String,
    pub headers: HeaderMap,
}

/// A fully-buffered response from the transformer, used on the normal
/// cache-miss path where the orchestrator needs the whole body to decide
/// cacheability and hand it to the Coalescer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_type: String,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_cacheable_content_type(&self) -> bool {
        self.content_type.starts_with("video/") || self.content_type.starts_with("image/")
    }
}

/// A streamed response used by the Fallback Streamer, which must not buffer
/// the whole body before teeing it to the client.
pub struct UpstreamStreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub body: Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>,
}

/// Sentinel statuses the transformer uses to signal it can't (or won't)
/// produce a variant, distinct from an ordinary upstream failure (§7).
const SOURCE_TOO_LARGE_STATUS: u16 = 413;
const TRANSFORMER_REJECTED_STATUS: u16 = 422;

#[async_trait]
pub trait FetchUpstream: Send + Sync {
    /// Fetch and fully buffer a transformer response — the common path for
    /// cacheable variants.
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;

    /// Fetch a response as a stream without buffering it, used when the
    /// Fallback Streamer needs to tee a large or untransformable body
    /// straight through to the client.
    async fn fetch_stream(&self, req: UpstreamRequest) -> Result<UpstreamStreamResponse, ProxyError>;
}

/// Rewrites `url` to carry the cache-busting `v=<version>` query parameter
/// (§4.B effect); a no-op for `version <= 1` per the orchestrator's rule
/// that only a real bump is worth forwarding.
pub fn with_version_param(url: &str, version: u32) -> String {
    if version <= 1 {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}v={}", url, separator, version)
}

/// `hyper`-backed implementation over a pooled keep-alive client, mirroring
/// the pool-per-source posture of the teacher's S3 connection handling.
pub struct HttpFetchUpstream {
    client: Client<HttpConnector, http_body_util::Full<Bytes>>,
    timeout: Duration,
}

impl HttpFetchUpstream {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            timeout,
        }
    }

    fn classify_status(status: u16, body: &Bytes) -> Option<ProxyError> {
        match status {
            SOURCE_TOO_LARGE_STATUS => Some(ProxyError::SourceTooLarge),
            TRANSFORMER_REJECTED_STATUS => Some(ProxyError::TransformerRejected(
                String::from_utf8_lossy(body).to_string(),
            )),
            _ => None,
        }
    }
}

#[async_trait]
impl FetchUpstream for HttpFetchUpstream {
    async fn fetch(&self, req: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let uri: http::Uri = req
            .url
            .parse()
            .map_err(|e| ProxyError::BadRequest(format!("invalid upstream URL: {}", e)))?;

        let mut builder = hyper::Request::builder().method(req.method).uri(uri);
        for (name, value) in req.headers.iter() {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(http_body_util::Full::new(Bytes::new()))
            .map_err(|e| ProxyError::Internal(format!("failed to build upstream request: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| ProxyError::Timeout)?
            .map_err(|e| ProxyError::UpstreamError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::UpstreamError(e.to_string()))?
            .to_bytes();

        if let Some(e) = Self::classify_status(status, &body) {
            return Err(e);
        }

        Ok(UpstreamResponse {
            status,
            headers,
            content_type,
            body,
        })
    }

    async fn fetch_stream(&self, req: UpstreamRequest) -> Result<UpstreamStreamResponse, ProxyError> {
        let uri: http::Uri = req
            .url
            .parse()
            .map_err(|e| ProxyError::BadRequest(format!("invalid upstream URL: {}", e)))?;

        let mut builder = hyper::Request::builder().method(req.method).uri(uri);
        for (name, value) in req.headers.iter() {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
            .map_err(|e| ProxyError::Internal(format!("failed to build upstream request: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::UpstreamError(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content_length = headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let body_stream = response
            .into_body()
            .into_data_stream()
            .map(|result| result.map_err(|e| ProxyError::UpstreamError(e.to_string())));

        Ok(UpstreamStreamResponse {
            status,
            headers,
            content_length,
            body: Box::pin(body_stream),
        })
    }
}
