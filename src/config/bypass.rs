//! Cache bypass surface configuration (§6).
//!
//! Configurable the same way the teacher makes coalescing strategy
//! configurable (`config::coalescing::CoalescingConfig`): fixed recognized
//! names with a toggle, not an arbitrary user-defined list, since the bypass
//! surface is part of the gateway's contract with callers.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassConfig {
    /// Recognize `?debug`, `?nocache`, `?no-kv-cache` query params.
    #[serde(default = "default_true")]
    pub query_params_enabled: bool,
    /// Recognize `Cache-Control: no-cache` and `X-Bypass-Cache: true` headers.
    #[serde(default = "default_true")]
    pub headers_enabled: bool,
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            query_params_enabled: true,
            headers_enabled: true,
        }
    }
}
