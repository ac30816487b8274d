//! Single-producer, multi-consumer media distribution
//!
//! `media-fanout` reads frames or audio chunks from one blocking source,
//! broadcasts each unit to every interested consumer, and encodes the latest
//! unit at a bounded rate for any number of transport tracks.
//!
//! # Architecture
//!
//! ```text
//!   ResourceRegistry          MediaSource ──► BroadcastEngine (per format)
//!   (shared devices)               │                 │
//!                                  │          MediaStream handles
//!                                  │                 │
//!                                  └──── pump ───────┘
//!                                         │ latest-wins
//!                                         ▼
//!                  StreamServer ──►  Sink ──► encoder ──► tracks
//! ```
//!
//! # Example
//!
//! ```ignore
//! let source = VideoSource::new(camera_reader, VideoProps::new(1280, 720, 30.0));
//! let server = StreamServer::default();
//! let sink = server.new_stream(SinkConfig::with_name("camera"), factory)?;
//!
//! let cancel = CancellationToken::new();
//! stream_source(&source, "", &sink, &cancel).await?;
//! ```

pub mod error;
pub mod media;
pub mod pump;
pub mod registry;
pub mod server;
pub mod sink;
pub mod source;
pub mod stats;

pub use error::{BoxError, MediaError, Result};
pub use media::{AudioChunk, MediaReader, MediaUnit, ReadContext, ReleasePair, Shaped, VideoFrame};
pub use pump::{stream_source, BackoffConfig, ErrorAction, ErrorPolicy};
pub use registry::{Driver, ResourceRegistry};
pub use server::{ServerConfig, StreamServer};
pub use sink::{Encoder, EncoderFactory, Sink, SinkConfig, TransportTrack};
pub use source::{AudioSource, MediaSource, MediaStream, SourceConfig, VideoSource};
