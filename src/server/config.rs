//! Server configuration

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum registered streams (0 = unlimited)
    pub max_streams: usize,

    /// Start streams as soon as they are registered
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_streams: 0, // Unlimited
            auto_start: true,
        }
    }
}

impl ServerConfig {
    /// Set maximum registered streams
    pub fn max_streams(mut self, max: usize) -> Self {
        self.max_streams = max;
        self
    }

    /// Leave registered streams stopped until the caller starts them
    pub fn manual_start(mut self) -> Self {
        self.auto_start = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.max_streams, 0);
        assert!(config.auto_start);
    }

    #[test]
    fn test_builder_max_streams() {
        let config = ServerConfig::default().max_streams(4);

        assert_eq!(config.max_streams, 4);
    }

    #[test]
    fn test_builder_manual_start() {
        let config = ServerConfig::default().manual_start();

        assert!(!config.auto_start);
    }
}
