//! Source-to-sink pump
//!
//! Connects a media source to a sink: one consumer handle on the source,
//! every unit it yields posted into the sink's input.
//!
//! ```text
//!   MediaSource ──next()──► pump ──send()──► Sink input
//!                             │
//!                   read error? ask the ErrorPolicy
//!                   Skip | Backoff(d) | Stop
//! ```
//!
//! The default policy backs off exponentially on repeated identical errors
//! and gives up after `BackoffConfig::max_attempts` of them in a row.

pub mod config;
pub mod policy;
pub mod runner;

pub use config::BackoffConfig;
pub use policy::{BackoffPolicy, ErrorAction, ErrorPolicy};
pub use runner::{stream_source, stream_source_with_backoff, stream_source_with_policy};
