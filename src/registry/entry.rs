//! Registry entry
//!
//! Per-label state stored in the resource registry.

use std::sync::Arc;
use std::time::Instant;

use super::driver::Driver;

/// Reference-counted handle to an open driver
pub struct ResourceEntry {
    /// The open driver
    pub(super) driver: Arc<dyn Driver>,

    /// Number of sources referencing the driver
    pub(super) count: usize,

    /// When the driver was opened
    pub opened_at: Instant,
}

impl ResourceEntry {
    pub(super) fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            count: 1,
            opened_at: Instant::now(),
        }
    }

    /// Current reference count
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Result of dropping one reference to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The last reference went away and the driver was closed
    Released,
    /// Other references remain; the value is how many
    InUse(usize),
}

impl ReleaseOutcome {
    /// Whether the driver was physically closed
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}
