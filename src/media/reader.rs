//! Source reader interface and release plumbing
//!
//! A reader is the blocking producer behind a `MediaSource`: a camera, a
//! microphone, a screen grabber or a synthetic generator. Each read hands back
//! the data plus an optional release callback that recycles the underlying
//! buffer once nobody needs it as the current unit anymore.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Callback that returns a unit's resources to its producer
pub type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// One unit produced by a reader
pub struct MediaUnit<T> {
    /// The media payload
    pub data: T,
    /// Invoked exactly once when the unit is superseded
    pub release: Option<ReleaseFn>,
}

impl<T> MediaUnit<T> {
    /// A unit with nothing to release
    pub fn new(data: T) -> Self {
        Self {
            data,
            release: None,
        }
    }

    /// A unit with a release callback
    pub fn with_release(data: T, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            data,
            release: Some(Box::new(release)),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for MediaUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaUnit")
            .field("data", &self.data)
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

/// What a single read is for
///
/// Carries the format key of the engine asking for the unit, so a reader can
/// produce format-specific output, and the engine's cancellation token. A
/// reader that blocks for long should poll `is_cancelled` and return early.
#[derive(Debug, Clone)]
pub struct ReadContext {
    format: String,
    cancel: CancellationToken,
}

impl ReadContext {
    pub fn new(format: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            format: format.into(),
            cancel,
        }
    }

    /// Format key the unit is read for. Empty for the default format.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the engine stopped wanting this read
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Blocking source of media units
///
/// Calls are always serialized: a source never reads from two threads at once.
pub trait MediaReader<T>: Send + 'static {
    /// Produce the next unit for `ctx`, blocking until it is available
    fn read(&mut self, ctx: &ReadContext) -> Result<MediaUnit<T>>;

    /// Release reader resources. Called once when the owning source closes.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T, F> MediaReader<T> for F
where
    F: FnMut(&ReadContext) -> Result<MediaUnit<T>> + Send + 'static,
{
    fn read(&mut self, ctx: &ReadContext) -> Result<MediaUnit<T>> {
        self(ctx)
    }
}

/// A unit handed across the source/sink boundary
///
/// The release callback runs when the pair is dropped, so every code path in
/// the receiver releases exactly once.
pub struct ReleasePair<T> {
    /// Shared payload
    pub unit: Arc<T>,
    release: Option<ReleaseFn>,
}

/// Video frame crossing into a sink
pub type FrameReleasePair = ReleasePair<crate::media::VideoFrame>;

/// Audio chunk crossing into a sink
pub type AudioChunkReleasePair = ReleasePair<crate::media::AudioChunk>;

impl<T: std::fmt::Debug> std::fmt::Debug for ReleasePair<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasePair")
            .field("unit", &self.unit)
            .field("release", &self.release.is_some())
            .finish()
    }
}

impl<T> ReleasePair<T> {
    /// Pair without a release callback
    pub fn new(unit: Arc<T>) -> Self {
        Self {
            unit,
            release: None,
        }
    }

    /// Pair that runs `release` once the receiver is done with it
    pub fn with_release(unit: Arc<T>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unit,
            release: Some(Box::new(release)),
        }
    }

    /// Run the release callback now
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl<T> Drop for ReleasePair<T> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
