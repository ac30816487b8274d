//! Media sources and broadcast engines
//!
//! A source wraps one blocking reader and shares it with any number of
//! consumers. Each distinct format key gets its own broadcast engine; each
//! engine runs at most one production task, and only while handles are open.
//!
//! # Architecture
//!
//! ```text
//!                     MediaSource<T, P>
//!              ┌───────────────────────────────┐
//!              │ reader: Mutex<dyn MediaReader> │
//!              │ engines: HashMap<format,       │
//!              │   BroadcastEngine {            │
//!              │     current, interested,       │
//!              │     producer_wait,             │
//!              │     consumer_wait,             │
//!              │   }                            │
//!              │ >                              │
//!              └───────────────┬───────────────┘
//!                              │ one read per cycle
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   [MediaStream]        [MediaStream]        [MediaStream]
//!      next()               next()               next()
//! ```
//!
//! # Latest-wins
//!
//! Engines hand out the most recent unit, never a backlog. A slow consumer
//! may skip units entirely; a fast one never sees a unit twice.

pub mod config;
pub mod engine;
pub mod media_source;
pub mod stream;

pub use config::SourceConfig;
pub use engine::{BroadcastEngine, ErrorHandler};
pub use media_source::{read_media, AudioSource, MediaSource, VideoSource};
pub use stream::MediaStream;
