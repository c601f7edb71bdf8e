//! Debug / diagnostics endpoints under `/admin/cache/*` (§11 peripheral
//! collaborator).
//!
//! Grounded on the teacher's `admin::mod` + `admin::prewarm` shape: a
//! `is_handled_path` gate followed by a routed `handle_request`, and
//! functions returning a plain response value instead of writing to a
//! session directly (the same design the teacher calls out in
//! `proxy::special_endpoints`: "returns `EndpointResponse` instead of
//! writing directly to session ... avoids borrow checker issues and keeps
//! response generation testable").
//!
//! The teacher gates this tree behind JWT admin claims
//! (`auth::verify_admin_claims`); this gateway carries no client-auth
//! dependency at all (`jsonwebtoken` is dropped, see DESIGN.md), so these
//! endpoints are unauthenticated here and are expected to sit behind
//! network-level access control (an internal-only listener, a sidecar
//! proxy) rather than an in-process check.

use std::sync::Arc;

use serde::Serialize;

use crate::orchestrator::CacheOrchestrator;

/// A generated admin response, analogous to the teacher's
/// `special_endpoints::EndpointResponse`.
#[derive(Debug, Clone)]
pub struct AdminResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl AdminResponse {
    fn json(status: u16, value: impl Serialize) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, serde_json::json!({ "status": "error", "message": message.into() }))
    }
}

/// True if `path` falls under the admin cache tree and should be routed to
/// [`handle_request`] rather than the ordinary transform pipeline.
pub fn is_handled_path(path: &str) -> bool {
    path.starts_with("/admin/cache/diagnostics") || path.starts_with("/admin/cache/bust")
}

/// Route a request already known to satisfy [`is_handled_path`].
///
/// - `GET /admin/cache/diagnostics?key=<fingerprint>` returns the cache
///   diagnostics record for that fingerprint.
/// - `POST /admin/cache/bust?key=<fingerprint>` forces a version bump,
///   invalidating every cached entry for that fingerprint.
pub async fn handle_request(path: &str, method: &http::Method, query: &str, orchestrator: &Arc<CacheOrchestrator>) -> AdminResponse {
    let key = match query_param(query, "key") {
        Some(k) => k,
        None => return AdminResponse::error(400, "missing required 'key' query parameter"),
    };

    match (path, method) {
        (p, &http::Method::GET) if p.starts_with("/admin/cache/diagnostics") => {
            let diagnostics = orchestrator.get_diagnostics(&key).await;
            AdminResponse::json(200, diagnostics)
        }
        (p, &http::Method::POST) if p.starts_with("/admin/cache/bust") => {
            orchestrator.invalidate_fingerprint(&key).await;
            AdminResponse::json(200, serde_json::json!({ "status": "ok", "key": key }))
        }
        _ => AdminResponse::error(405, "method not allowed for this admin endpoint"),
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BypassConfig, CacheConfig};
    use crate::edge_cache::MokaEdgeCache;
    use crate::metrics::Metrics;
    use crate::object_store::{InMemoryKv, KvChunkedObjectStore};
    use crate::version::InMemoryVersionStore;

    fn orchestrator() -> Arc<CacheOrchestrator> {
        Arc::new(CacheOrchestrator::new(
            Arc::new(MokaEdgeCache::new(1024 * 1024, 1024 * 1024)),
            Arc::new(KvChunkedObjectStore::new(Arc::new(InMemoryKv::new()), 1024 * 1024, 1024 * 1024, 1000, 4)),
            Arc::new(InMemoryVersionStore::new()),
            Arc::new(Metrics::new()),
            CacheConfig::default(),
            BypassConfig::default(),
        ))
    }

    #[test]
    fn recognizes_handled_paths() {
        assert!(is_handled_path("/admin/cache/diagnostics"));
        assert!(is_handled_path("/admin/cache/bust"));
        assert!(!is_handled_path("/videos/a.mp4"));
    }

    #[tokio::test]
    async fn diagnostics_requires_key_param() {
        let orch = orchestrator();
        let resp = handle_request("/admin/cache/diagnostics", &http::Method::GET, "", &orch).await;
        assert_eq!(resp.status, 400);
    }

    #[tokio::test]
    async fn diagnostics_returns_default_record_for_unseen_key() {
        let orch = orchestrator();
        let resp = handle_request("/admin/cache/diagnostics", &http::Method::GET, "key=fp1", &orch).await;
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("\"version\""));
    }

    #[tokio::test]
    async fn bust_invalidates_and_returns_ok() {
        let orch = orchestrator();
        let resp = handle_request("/admin/cache/bust", &http::Method::POST, "key=fp1", &orch).await;
        assert_eq!(resp.status, 200);
        assert!(resp.body.contains("\"ok\""));
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let orch = orchestrator();
        let resp = handle_request("/admin/cache/bust", &http::Method::GET, "key=fp1", &orch).await;
        assert_eq!(resp.status, 405);
    }
}
