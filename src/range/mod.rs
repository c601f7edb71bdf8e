//! Component D: range engine (§4.D).
//!
//! Parses `Range` headers and walks a chunked object's manifest to produce
//! a 206 response without re-reading chunks that fall entirely outside the
//! requested window. Grounded on the teacher's byte-range vocabulary in
//! `cache::sendfile` (offset/length framing for partial reads) and the
//! `bytes=` prefix / 416-status conventions exercised in `proxy::mod`'s
//! tests, generalized here from a single sendfile call to a multi-chunk walk.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::constants::CHUNK_READ_TIMEOUT_SECS;
use crate::object_store::{ChunkedObjectStore, StoreError};
use crate::object_store::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Inclusive byte range, both bounds valid against `total_size`.
    Satisfiable(u64, u64),
    /// Range header present but not satisfiable against `total_size` (416).
    Unsatisfiable,
    /// No `Range` header, or a malformed one — serve the full body (200).
    NotARange,
    /// Multiple ranges requested; treated as a full 200 response (§4.D.1 —
    /// multipart/byteranges is out of scope).
    MultiRange,
}

/// Parse a `Range` request header against a known total size.
pub fn parse_range(header: Option<&str>, total_size: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::NotARange;
    };
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeOutcome::NotARange;
    };

    if spec.contains(',') {
        return RangeOutcome::MultiRange;
    }

    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::NotARange;
    };

    if total_size == 0 {
        return RangeOutcome::Unsatisfiable;
    }

    // Suffix range: "-500" means the last 500 bytes.
    if start_str.is_empty() {
        let Ok(suffix_len) = end_str.parse::<u64>() else {
            return RangeOutcome::NotARange;
        };
        if suffix_len == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let start = total_size.saturating_sub(suffix_len);
        return RangeOutcome::Satisfiable(start, total_size - 1);
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeOutcome::NotARange;
    };

    let end = if end_str.is_empty() {
        total_size - 1
    } else {
        match end_str.parse::<u64>() {
            Ok(e) => e,
            Err(_) => return RangeOutcome::NotARange,
        }
    };

    if start > end || start >= total_size {
        return RangeOutcome::Unsatisfiable;
    }

    RangeOutcome::Satisfiable(start, end.min(total_size - 1))
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RangeError {
    #[error("requested range is not satisfiable for this object")]
    Unsatisfiable,
    #[error("object store error while serving range: {0}")]
    Store(String),
    #[error("chunk read timed out")]
    Timeout,
}

impl From<StoreError> for RangeError {
    fn from(e: StoreError) -> Self {
        RangeError::Store(e.to_string())
    }
}

pub struct RangedBody {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
    pub content_length: u64,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, RangeError>> + Send>>,
}

impl RangedBody {
    pub fn content_range_header(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

/// Serve `[start, end]` (inclusive) out of a chunked object's manifest.
/// Walks chunks by running offset, slicing the chunks at the boundary with
/// zero-copy `Bytes::slice`. Mid-stream chunk-fetch errors emit the expected
/// count of zero bytes if the client is still connected, preserving byte
/// position for the remainder of the response (§4.D); the caller detects
/// disconnects and aborts the stream from the outside since that check
/// belongs to the proxy glue, not this engine.
pub fn serve_range(
    store: std::sync::Arc<dyn ChunkedObjectStore>,
    fp: String,
    manifest: Manifest,
    start: u64,
    end: u64,
) -> Result<RangedBody, RangeError> {
    if start > end || end >= manifest.total_size {
        return Err(RangeError::Unsatisfiable);
    }

    let content_length = end - start + 1;
    let total_size = manifest.total_size;
    let chunk_sizes = manifest.actual_chunk_sizes.clone();

    // Determine which chunks overlap [start, end].
    let mut offset = 0u64;
    let mut overlap: Vec<(usize, u64, u64)> = Vec::new(); // (chunk index, slice_start, slice_end_excl)
    for (i, &size) in chunk_sizes.iter().enumerate() {
        let chunk_start = offset;
        let chunk_end = offset + size; // exclusive
        if chunk_end > start && chunk_start < end + 1 {
            let slice_start = start.max(chunk_start) - chunk_start;
            let slice_end = (end + 1).min(chunk_end) - chunk_start;
            overlap.push((i, slice_start, slice_end));
        }
        offset = chunk_end;
        if chunk_start > end {
            break;
        }
    }

    let manifest = std::sync::Arc::new(manifest);
    let fp = std::sync::Arc::new(fp);

    let body = stream::iter(overlap).then(move |(index, slice_start, slice_end)| {
        let store = store.clone();
        let manifest = manifest.clone();
        let fp = fp.clone();
        async move {
            let expected_len = slice_end - slice_start;
            let fetch = store.get_chunk(&fp, &manifest, index);
            match tokio::time::timeout(Duration::from_secs(CHUNK_READ_TIMEOUT_SECS), fetch).await {
                Ok(Ok(chunk)) => {
                    let slice_end = slice_end.min(chunk.len() as u64);
                    Ok(chunk.slice(slice_start as usize..slice_end as usize))
                }
                Ok(Err(e)) => {
                    tracing::warn!(chunk = index, error = %e, "range read failed, padding with zeros");
                    Ok(Bytes::from(vec![0u8; expected_len as usize]))
                }
                Err(_) => Err(RangeError::Timeout),
            }
        }
    });

    Ok(RangedBody {
        start,
        end,
        total_size,
        content_length,
        stream: Box::pin(body),
    })
}
