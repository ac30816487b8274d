//! Media unit types
//!
//! A unit is one discrete piece of media: a video frame or an audio chunk.
//! Each unit has a shape (width x height, or sample rate x channels) that
//! decides which encoder instance can accept it.

use std::fmt::{Debug, Display};

use bytes::Bytes;

/// Anything that can be encoded by a shape-bound encoder
pub trait Shaped: Send + Sync + 'static {
    /// Dimensional descriptor compared between consecutive units
    type Shape: Copy + PartialEq + Debug + Display + Send + Sync + 'static;

    /// Shape of this unit
    fn shape(&self) -> Self::Shape;

    /// Whether the unit carries no payload (skipped by sinks)
    fn is_empty(&self) -> bool;
}

/// Pixel layout of a raw video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba,
    /// Planar YUV 4:2:0
    I420,
}

impl PixelFormat {
    /// Number of bytes needed for a frame of the given size
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgba => pixels * 4,
            PixelFormat::I420 => pixels + 2 * (pixels.div_ceil(4)),
        }
    }
}

/// Video frame shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoShape {
    pub width: u32,
    pub height: u32,
}

impl Display for VideoShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A raw video frame
///
/// Pixel data is held in `Bytes`, so clones share the allocation.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Capture timestamp in milliseconds
    pub timestamp: u64,
    /// Pixel data
    pub data: Bytes,
}

impl VideoFrame {
    /// Create a frame from raw pixel data
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Bytes) -> Self {
        Self {
            width,
            height,
            format,
            timestamp: 0,
            data,
        }
    }

    /// Create a zero-filled RGBA frame
    pub fn blank(width: u32, height: u32) -> Self {
        let size = PixelFormat::Rgba.frame_size(width, height);
        Self::new(width, height, PixelFormat::Rgba, Bytes::from(vec![0u8; size]))
    }

    /// Set the capture timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Shaped for VideoFrame {
    type Shape = VideoShape;

    fn shape(&self) -> VideoShape {
        VideoShape {
            width: self.width,
            height: self.height,
        }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }
}

/// Audio chunk shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioShape {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Display for AudioShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// A chunk of interleaved PCM audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl AudioChunk {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    /// Number of frames (samples per channel) in the chunk
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

impl Shaped for AudioChunk {
    type Shape = AudioShape;

    fn shape(&self) -> AudioShape {
        AudioShape {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    fn is_empty(&self) -> bool {
        self.channels == 0 || self.samples.is_empty()
    }
}
