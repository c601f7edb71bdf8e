//! Component A: canonical cache key derivation (§4.A).
//!
//! `fingerprint()` is a pure function from `TransformRecipe` to a cache key
//! string; `CacheKey` wraps that string the way the teacher's
//! `cache::entry::CacheKey` wraps bucket+object_key, except the fingerprint
//! already encodes mode/path/recipe so there is only one field here.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::constants::{FINGERPRINT_MAX_BYTES, FINGERPRINT_SUFFIX_HEX_LEN};
use crate::recipe::TransformRecipe;

/// Cache key, always equal to a sanitized fingerprint string (§3: "Cache Key
/// = Fingerprint"). `Display`/`FromStr` round-trip for the same reason the
/// teacher's `CacheKey` does: keys travel through config, logs, and the
/// durable tier's wire format as plain strings.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(fp: impl Into<String>) -> Self {
        CacheKey(fp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn chunk_key(&self, index: u32) -> String {
        chunk_key(&self.0, index)
    }

    pub fn version_key(&self) -> String {
        version_key(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CacheKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CacheKey(s.to_string()))
    }
}

impl From<&TransformRecipe> for CacheKey {
    fn from(recipe: &TransformRecipe) -> Self {
        CacheKey(fingerprint(recipe))
    }
}

/// `<Fingerprint>_chunk_<i>` (§3, §4.C).
pub fn chunk_key(fp: &str, index: u32) -> String {
    format!("{}_chunk_{}", fp, index)
}

/// `version-<Fingerprint>` (§3, §4.B).
pub fn version_key(fp: &str) -> String {
    format!("version-{}", fp)
}

/// Build the canonical cache key string for a recipe (§4.A).
///
/// `mode:<m>:<path>` followed by either `:derivative=<name>` (derivative
/// requests are fingerprinted by name alone — fields resolved from it are
/// not re-encoded) or the fixed-order concatenation of active fields
/// `w,h,f,q,c,t,dur,cols,rows,interval`, then sorted `customData` pairs.
/// Sanitized to `[A-Za-z0-9:/=.*_-]` and capped at 512 bytes.
pub fn fingerprint(recipe: &TransformRecipe) -> String {
    let mut raw = format!("mode:{}:{}", recipe.mode.as_str(), recipe.source_path);

    if let Some(name) = &recipe.derivative {
        raw.push_str(&format!(":derivative={}", name));
    } else {
        push_field(&mut raw, "w", recipe.width.map(|v| v.to_string()));
        push_field(&mut raw, "h", recipe.height.map(|v| v.to_string()));
        push_field(&mut raw, "f", recipe.format.clone());
        push_field(&mut raw, "q", recipe.quality.map(|q| q.as_str().to_string()));
        push_field(&mut raw, "c", recipe.compression.map(|c| c.as_str().to_string()));
        push_field(&mut raw, "t", recipe.window.time.map(|v| v.to_string()));
        push_field(&mut raw, "dur", recipe.window.duration.map(|v| v.to_string()));
        push_field(&mut raw, "cols", recipe.cols.map(|v| v.to_string()));
        push_field(&mut raw, "rows", recipe.rows.map(|v| v.to_string()));
        push_field(&mut raw, "interval", recipe.interval.map(|v| v.to_string()));

        let mut custom = recipe.custom_data.clone();
        custom.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in custom {
            raw.push_str(&format!(":{}={}", k, v));
        }
    }

    sanitize_and_cap(&raw)
}

fn push_field(raw: &mut String, name: &str, value: Option<String>) {
    if let Some(v) = value {
        raw.push_str(&format!(":{}={}", name, v));
    }
}

fn sanitize_and_cap(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "/:=.*_-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.len() <= FINGERPRINT_MAX_BYTES {
        return sanitized;
    }

    // Truncate then append a short content hash of the full string so two
    // fingerprints that agree on the first MAX_BYTES - suffix bytes but
    // diverge afterward don't collide.
    let mut hasher = Sha256::new();
    hasher.update(sanitized.as_bytes());
    let digest = hasher.finalize();
    let suffix: String = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        [..FINGERPRINT_SUFFIX_HEX_LEN]
        .to_string();

    let keep = FINGERPRINT_MAX_BYTES - FINGERPRINT_SUFFIX_HEX_LEN - 1;
    let mut truncated = truncate_at_char_boundary(&sanitized, keep);
    truncated.push('-');
    truncated.push_str(&suffix);
    truncated
}

fn truncate_at_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Remove the version query parameter and bypass flags from a copy of the
/// query string so `fingerprint` stays stable across retries and version
/// bumps (§4.A). Never mutates the caller's original request.
pub fn strip_volatile_query(query: &str) -> String {
    const VOLATILE: &[&str] = &["v", "debug", "nocache", "no-kv-cache"];

    let kept: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let name = pair.split('=').next().unwrap_or("");
            !VOLATILE.contains(&name)
        })
        .map(|s| s.to_string())
        .collect();

    kept.join("&")
}
