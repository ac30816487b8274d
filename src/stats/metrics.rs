//! Statistics for broadcast engines and sinks

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine-level statistics
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Format key of the engine
    pub format: String,
    /// Live consumer handles
    pub listeners: usize,
    /// Whether a production task is running
    pub running: bool,
    /// Completed production cycles
    pub cycles: u64,
    /// Successful physical reads
    pub reads: u64,
    /// Failed physical reads
    pub read_errors: u64,
}

impl EngineStats {
    /// Fraction of cycles that ended in a read error
    pub fn error_ratio(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.read_errors as f64 / self.cycles as f64
        }
    }
}

/// Sink-level statistics
#[derive(Debug, Clone)]
pub struct SinkStats {
    /// Sink name
    pub name: String,
    /// Time since the sink was created
    pub uptime: Duration,
    /// Pairs taken off the input mailbox
    pub received: u64,
    /// Pairs replaced in the mailbox before the rate loop took them
    pub superseded: u64,
    /// Units successfully encoded
    pub encoded: u64,
    /// Units dropped because encoding failed
    pub encode_errors: u64,
    /// Encoder constructions (first use plus shape changes)
    pub encoder_inits: u64,
    /// Encoded bytes written, summed over tracks
    pub bytes_written: u64,
    /// Failed track writes
    pub write_errors: u64,
    /// Payloads dropped for a track whose writer queue was full
    pub dropped_writes: u64,
}

impl SinkStats {
    /// Encoded units per second since creation
    pub fn encode_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.encoded as f64 / secs
        } else {
            0.0
        }
    }
}

/// Live counters behind `EngineStats`
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub cycles: AtomicU64,
    pub reads: AtomicU64,
    pub read_errors: AtomicU64,
}

impl EngineCounters {
    pub fn snapshot(&self, format: &str, listeners: usize, running: bool) -> EngineStats {
        EngineStats {
            format: format.to_string(),
            listeners,
            running,
            cycles: self.cycles.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }
}

/// Live counters behind `SinkStats`
#[derive(Debug)]
pub(crate) struct SinkCounters {
    pub created_at: Instant,
    pub received: AtomicU64,
    pub superseded: AtomicU64,
    pub encoded: AtomicU64,
    pub encode_errors: AtomicU64,
    pub encoder_inits: AtomicU64,
    pub bytes_written: AtomicU64,
    pub write_errors: AtomicU64,
    pub dropped_writes: AtomicU64,
}

impl SinkCounters {
    pub fn new() -> Self {
        Self {
            created_at: Instant::now(),
            received: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
            encoded: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
            encoder_inits: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            dropped_writes: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, name: &str) -> SinkStats {
        SinkStats {
            name: name.to_string(),
            uptime: self.created_at.elapsed(),
            received: self.received.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            encoded: self.encoded.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            encoder_inits: self.encoder_inits.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_counters_snapshot() {
        let counters = EngineCounters::default();
        counters.cycles.fetch_add(4, Ordering::Relaxed);
        counters.reads.fetch_add(3, Ordering::Relaxed);
        counters.read_errors.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot("video/vp8", 2, true);

        assert_eq!(stats.format, "video/vp8");
        assert_eq!(stats.listeners, 2);
        assert!(stats.running);
        assert_eq!(stats.cycles, 4);
        assert_eq!(stats.reads, 3);
        assert_eq!(stats.read_errors, 1);
        assert!((stats.error_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_engine_stats_error_ratio_no_cycles() {
        let stats = EngineCounters::default().snapshot("", 0, false);
        assert_eq!(stats.error_ratio(), 0.0);
    }

    #[test]
    fn test_sink_counters_snapshot() {
        let counters = SinkCounters::new();
        SinkCounters::incr(&counters.received);
        SinkCounters::incr(&counters.encoded);
        SinkCounters::incr(&counters.encoder_inits);
        counters.bytes_written.fetch_add(1200, Ordering::Relaxed);

        let stats = counters.snapshot("camera");

        assert_eq!(stats.name, "camera");
        assert_eq!(stats.received, 1);
        assert_eq!(stats.encoded, 1);
        assert_eq!(stats.encoder_inits, 1);
        assert_eq!(stats.bytes_written, 1200);
        assert_eq!(stats.encode_errors, 0);
        assert_eq!(stats.write_errors, 0);
        assert_eq!(stats.dropped_writes, 0);
        assert!(stats.encode_rate() >= 0.0);
    }
}
