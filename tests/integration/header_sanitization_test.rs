//! Testable property 9 (spec.md §8): responses written to the edge tier
//! have no `Set-Cookie`, no `Vary`, no `Transfer-Encoding`; they carry
//! `Accept-Ranges: bytes` and an exact numeric `Content-Length`.

use bytes::Bytes;
use http::HeaderMap;

use videogate::edge_cache::prepare_for_storage;

#[test]
fn strips_set_cookie_vary_and_transfer_encoding() {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::SET_COOKIE, "session=abc123".parse().unwrap());
    headers.insert(http::header::VARY, "Accept-Encoding, User-Agent".parse().unwrap());
    headers.insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());

    let body = Bytes::from_static(b"sanitized body");
    let sanitized = prepare_for_storage(headers, &body);

    assert!(!sanitized.contains_key(http::header::SET_COOKIE));
    assert!(!sanitized.contains_key(http::header::VARY));
    assert!(!sanitized.contains_key(http::header::TRANSFER_ENCODING));
}

#[test]
fn sets_exact_content_length_and_accept_ranges() {
    let body = Bytes::from_static(b"fourteen bytes"); // 14 bytes
    let sanitized = prepare_for_storage(HeaderMap::new(), &body);

    assert_eq!(sanitized.get(http::header::CONTENT_LENGTH).unwrap(), body.len().to_string().as_str());
    assert_eq!(sanitized.get(http::header::ACCEPT_RANGES).unwrap(), "bytes");
}

#[test]
fn content_length_is_recomputed_even_if_the_origin_lied() {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_LENGTH, "999999".parse().unwrap());

    let body = Bytes::from_static(b"short");
    let sanitized = prepare_for_storage(headers, &body);

    assert_eq!(sanitized.get(http::header::CONTENT_LENGTH).unwrap(), "5");
}

#[test]
fn synthesizes_etag_and_last_modified_when_origin_omits_them() {
    let body = Bytes::from_static(b"needs a synthetic etag");
    let sanitized = prepare_for_storage(HeaderMap::new(), &body);

    assert!(sanitized.contains_key(http::header::ETAG));
    assert!(sanitized.contains_key(http::header::LAST_MODIFIED));
}

#[test]
fn preserves_an_origin_supplied_etag() {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::ETAG, "\"origin-etag\"".parse().unwrap());
    let body = Bytes::from_static(b"x");
    let sanitized = prepare_for_storage(headers, &body);

    assert_eq!(sanitized.get(http::header::ETAG).unwrap(), "\"origin-etag\"");
}
