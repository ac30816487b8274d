//! Physical resource interface
//!
//! A driver wraps exclusive hardware (a camera, a capture card, a microphone)
//! identified by a stable label. Several sources may read through the same
//! driver; the registry makes sure it is opened once and closed once.

use crate::error::BoxError;

/// A physical media resource
pub trait Driver: Send + Sync + 'static {
    /// Stable identifier shared by every source using this resource
    fn label(&self) -> &str;

    /// Open the resource. Called at most once per registry lifetime of the label.
    fn open(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Close the resource. Called exactly once, when the last reference goes away.
    fn close(&self) -> Result<(), BoxError>;
}
