//! Resource registry for shared hardware
//!
//! Many media sources can read through the same physical device. The registry
//! maps each device label to a reference count so that the device is opened on
//! first use and closed exactly once, when the last source lets go.
//!
//! # Lifecycle
//!
//! ```text
//!   acquire("/dev/video0")  ──►  open()   count = 1
//!   acquire("/dev/video0")  ──►           count = 2
//!   release("/dev/video0")  ──►           count = 1   InUse(1)
//!   release("/dev/video0")  ──►  close()  removed     Released
//! ```
//!
//! All mutation happens under a single mutex, so count updates and the final
//! close are atomic with respect to each other.

pub mod driver;
pub mod entry;
pub mod store;

pub use driver::Driver;
pub use entry::{ReleaseOutcome, ResourceEntry};
pub use store::ResourceRegistry;
