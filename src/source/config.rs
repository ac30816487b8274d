//! Source configuration

/// Default ceiling on distinct broadcast engines per source
pub const DEFAULT_MAX_ENGINES: usize = 256;

/// Media source configuration options
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Maximum number of distinct format keys (one engine each)
    pub max_engines: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_engines: DEFAULT_MAX_ENGINES,
        }
    }
}

impl SourceConfig {
    /// Set the engine ceiling (at least 1)
    pub fn max_engines(mut self, max: usize) -> Self {
        self.max_engines = max.max(1);
        self
    }
}
