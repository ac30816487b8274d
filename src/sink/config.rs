//! Sink configuration

/// Default target rate (units per second)
pub const DEFAULT_TARGET_RATE: u32 = 30;

/// Default depth of the encoded output queue
pub const DEFAULT_OUTPUT_CAPACITY: usize = 16;

/// Sink configuration options
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Stream identifier (empty = generated)
    pub name: String,

    /// MIME type of the encoded output (empty = taken from the encoder factory)
    pub mime_type: String,

    /// Units per second the rate loop will take from the input
    pub target_rate: u32,

    /// Encoded payloads buffered after the encoder, and again per track writer
    pub output_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mime_type: String::new(),
            target_rate: DEFAULT_TARGET_RATE,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl SinkConfig {
    /// Create a config with the given stream name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the stream name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the output MIME type
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Set the target rate; 0 falls back to the default
    pub fn target_rate(mut self, rate: u32) -> Self {
        self.target_rate = if rate == 0 { DEFAULT_TARGET_RATE } else { rate };
        self
    }

    /// Set the output queue depth (at least 1)
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity.max(1);
        self
    }
}
