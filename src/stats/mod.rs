//! Runtime statistics for engines and sinks

pub mod metrics;

pub use metrics::{EngineStats, SinkStats};
pub(crate) use metrics::{EngineCounters, SinkCounters};
