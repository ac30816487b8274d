//! Encoder interface
//!
//! Encoders are stateful and bound to one input shape. A sink never resizes
//! an encoder; when the shape changes it closes the old one and asks the
//! factory for a new one.

use bytes::Bytes;

use crate::error::BoxError;
use crate::media::Shaped;

/// Shape-bound encoder for units of type `T`
pub trait Encoder<T: Shaped>: Send + 'static {
    /// Encode one unit. `None` means the encoder buffered it and has nothing to emit yet.
    fn encode(&mut self, unit: &T) -> Result<Option<Bytes>, BoxError>;

    /// Release encoder resources
    fn close(&mut self) {}
}

/// Builds encoders for a given shape
pub trait EncoderFactory<T: Shaped>: Send + Sync + 'static {
    /// Construct an encoder for `shape` running at `target_rate` units per second
    fn new_encoder(&self, shape: T::Shape, target_rate: u32) -> Result<Box<dyn Encoder<T>>, BoxError>;

    /// MIME type of the produced bytes
    fn mime_type(&self) -> &str;
}
