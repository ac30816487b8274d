//! Media data model
//!
//! This module provides:
//! - Video frames and audio chunks with their shapes
//! - The blocking `MediaReader` interface sources are built on, and the
//!   `ReadContext` each read receives
//! - Release pairs that carry units into sinks
//! - Static source properties

pub mod frame;
pub mod props;
pub mod reader;

pub use frame::{AudioChunk, AudioShape, PixelFormat, Shaped, VideoFrame, VideoShape};
pub use props::{AudioProps, VideoProps};
pub use reader::{
    AudioChunkReleasePair, FrameReleasePair, MediaReader, MediaUnit, ReadContext, ReleaseFn,
    ReleasePair,
};
