//! Client-hints responsive-width detection (§11 peripheral collaborator).
//!
//! Reads `Sect-CH-Width`/`Sect-CH-DPR`/`Sect-CH-Viewport-Width` (the current
//! User-Agent Client Hints header names) and the older unprefixed `DPR`/
//! `Viewport-Width`/`Width` headers some CDNs still forward, and folds the
//! resolved viewport width into a small set of responsive buckets. Bucketing
//! follows the same "continuous value -> small fixed vocabulary" shape as
//! `image_optimizer::params::ImageParams`'s DPR and quality handling, so two
//! requests whose only difference is a few px of actual viewport collapse to
//! the same cache entry instead of fragmenting the edge tier.
//!
//! Feeds `TransformRecipe.custom_data` under the `"responsive-width"` key
//! rather than setting `width` directly — an explicit `w=` query param
//! always wins, this is only a fallback for callers that don't set one.

use http::HeaderMap;

/// Fixed responsive-width buckets, widest-first so `resolve` can short
/// circuit on the first bucket the viewport still fits.
const BUCKETS: &[u32] = &[3840, 2560, 1920, 1280, 1024, 768, 640, 320];

const CUSTOM_DATA_KEY: &str = "responsive-width";

fn header_f32(headers: &HeaderMap, name: &str) -> Option<f32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Resolve the logical (CSS) viewport width in device pixels, preferring the
/// modern `Sect-CH-*` hints and falling back to the legacy unprefixed ones.
fn resolve_device_width(headers: &HeaderMap) -> Option<u32> {
    let viewport = header_f32(headers, "sect-ch-viewport-width")
        .or_else(|| header_f32(headers, "viewport-width"))
        .or_else(|| header_f32(headers, "sect-ch-width"))
        .or_else(|| header_f32(headers, "width"))?;

    let dpr = header_f32(headers, "sect-ch-dpr")
        .or_else(|| header_f32(headers, "dpr"))
        .unwrap_or(1.0);

    if viewport <= 0.0 || dpr <= 0.0 {
        return None;
    }

    Some((viewport * dpr).round() as u32)
}

/// Snap a device-pixel width down to the nearest bucket at or above it, or
/// the narrowest bucket if even that's too wide.
fn bucket_for(device_width: u32) -> u32 {
    BUCKETS
        .iter()
        .rev()
        .find(|&&b| b >= device_width)
        .copied()
        .unwrap_or(*BUCKETS.first().unwrap())
}

/// Detect a responsive-width bucket from client-hints headers and append it
/// to `custom_data` as `responsive-width=<bucket>`, unless that key is
/// already present (an explicit caller-supplied value always wins) or no
/// usable client-hints headers are present at all.
pub fn apply(custom_data: &mut Vec<(String, String)>, headers: &HeaderMap) {
    if custom_data.iter().any(|(k, _)| k == CUSTOM_DATA_KEY) {
        return;
    }
    if let Some(device_width) = resolve_device_width(headers) {
        custom_data.push((CUSTOM_DATA_KEY.to_string(), bucket_for(device_width).to_string()));
    }
}
