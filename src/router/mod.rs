// Router module - maps request paths to configured sources.

use crate::config::SourceConfig;

/// Maps an incoming request path to the source (and therefore upstream
/// transformer) that should serve it, by longest-matching path prefix.
pub struct Router {
    sources: Vec<SourceConfig>,
}

impl Router {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Router { sources }
    }

    /// Find the source whose `path_prefix` matches `path`, preferring the
    /// longest prefix when more than one matches.
    pub fn route(&self, path: &str) -> Option<&SourceConfig> {
        self.sources
            .iter()
            .filter(|s| path.starts_with(&s.path_prefix))
            .max_by_key(|s| s.path_prefix.len())
    }
}
