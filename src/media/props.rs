//! Source properties
//!
//! Static descriptions of what a source produces, handed out by
//! `MediaSource::properties`.

use std::time::Duration;

/// Video source properties
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoProps {
    /// Native width in pixels
    pub width: u32,
    /// Native height in pixels
    pub height: u32,
    /// Nominal frames per second (0 = unknown)
    pub frame_rate: f32,
}

impl VideoProps {
    pub fn new(width: u32, height: u32, frame_rate: f32) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }
}

/// Audio source properties
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioProps {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Expected duration of a single chunk
    pub latency: Duration,
}

impl AudioProps {
    pub fn new(sample_rate: u32, channels: u16, latency: Duration) -> Self {
        Self {
            sample_rate,
            channels,
            latency,
        }
    }

    /// Chunks per second implied by the latency (0 when latency is unset)
    pub fn chunk_rate(&self) -> u32 {
        if self.latency.is_zero() {
            0
        } else {
            (Duration::from_secs(1).as_secs_f64() / self.latency.as_secs_f64()).round() as u32
        }
    }
}
