//! Proxy glue: turns a [`GatewayRequest`] into a routed, parsed recipe and
//! hands it to the [`CacheOrchestrator`] (§6 "core-exposed" surface).
//!
//! Grounded on the teacher's `proxy::request_filter` staged-pipeline shape
//! (routing, then special-endpoint short-circuit, then the cache path) and
//! `proxy::cache_handler`'s posture of returning a plain response value
//! instead of writing to a `Session` directly — that session-writing step
//! is left to the binary's Pingora `ProxyHttp` impl, which this module does
//! not depend on, mirroring the teacher's own `proxy::mod` (tests only, no
//! running server) called out in `server::mod`.

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;

use crate::admin;
use crate::akamai;
use crate::client_hints;
use crate::orchestrator::CacheOrchestrator;
use crate::recipe::{RecipeError, TransformRecipe};
use crate::router::Router;
use crate::types::{GatewayRequest, GatewayResponse, ResponseBody};
use crate::upstream::FetchUpstream;

/// Parse `a=b&c=d` query strings into a lookup map, the same shape
/// `TransformRecipe::from_query` and `akamai::apply` both expect. Percent-
/// decodes both key and value since query params commonly carry encoded
/// path segments (e.g. `format=image%2Fwebp`).
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let key = urlencoding::decode(k).map(|c| c.into_owned()).unwrap_or_else(|_| k.to_string());
            let value = urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string());
            (key, value)
        })
        .collect()
}

/// Build a [`TransformRecipe`] from a request's path and query, folding in
/// Akamai-style params (when present) and client-hints responsive-width
/// detection (§11 peripheral collaborators feeding the core's one input).
pub fn build_recipe(source_path: &str, query: &str, headers: &HeaderMap) -> Result<TransformRecipe, RecipeError> {
    let params = parse_query(query);
    let mut recipe = TransformRecipe::from_query(source_path, &params)?;

    if akamai::has_akamai_params(&params) {
        akamai::apply(&mut recipe, &params)?;
    }
    client_hints::apply(&mut recipe.custom_data, headers);

    recipe.validate()?;
    Ok(recipe)
}

fn bad_request(message: impl Into<String>) -> GatewayResponse {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
    GatewayResponse::new(400, headers, ResponseBody::Full(bytes::Bytes::from(message.into())))
}

fn admin_to_gateway(resp: admin::AdminResponse) -> GatewayResponse {
    let mut headers = HeaderMap::new();
    if let Ok(v) = http::HeaderValue::from_str(resp.content_type) {
        headers.insert(http::header::CONTENT_TYPE, v);
    }
    GatewayResponse::new(resp.status, headers, ResponseBody::Full(bytes::Bytes::from(resp.body)))
}

/// Route, parse, and serve one request end to end. Returns a 404-shaped
/// response (no body, not cached) when no configured source matches the
/// path, a 400 when the recipe fails validation, or whatever
/// [`CacheOrchestrator::serve_cached`] produces otherwise.
pub async fn handle_request(
    req: &GatewayRequest,
    router: &Router,
    orchestrator: &Arc<CacheOrchestrator>,
    fetch: Arc<dyn FetchUpstream>,
) -> GatewayResponse {
    if admin::is_handled_path(&req.path) {
        let resp = admin::handle_request(&req.path, &req.method, &req.query, orchestrator).await;
        return admin_to_gateway(resp);
    }

    let Some(source) = router.route(&req.path) else {
        return GatewayResponse::new(404, HeaderMap::new(), ResponseBody::empty());
    };

    let relative_path = req.path.strip_prefix(&source.path_prefix).unwrap_or(&req.path);

    let recipe = match build_recipe(relative_path, &req.query, &req.headers) {
        Ok(r) => r,
        Err(e) => return bad_request(e.to_string()),
    };

    orchestrator
        .serve_cached(req, &recipe, &source.upstream.base_url, fetch)
        .await
}
