//! Encode sinks
//!
//! A sink is the consuming end of a stream: it takes units at a bounded rate,
//! encodes them with a shape-bound encoder and fans the encoded bytes out to
//! every bound transport track.
//!
//! # Architecture
//!
//! ```text
//!                          Sink<T>
//!   ┌──────────────────────────────────────────────────────┐
//!   │  SinkInput ──► Mailbox (1 slot, latest wins)          │
//!   │                   │                                   │
//!   │                   ▼  every 1/target_rate              │
//!   │            encode loop ── shape changed? ──► factory  │
//!   │                   │                                   │
//!   │                   ▼  bounded queue                    │
//!   │             write loop                                │
//!   └───────────────────┬──────────────────────────────────┘
//!          ┌────────────┼────────────┐   queue per track, full = drop
//!          ▼            ▼            ▼
//!      writer A     writer B     writer C
//!          │            │            │
//!      [track A]    [track B]    [track C]
//! ```
//!
//! # Example
//!
//! ```ignore
//! let sink = Sink::new(SinkConfig::with_name("camera").target_rate(30), factory)?;
//! sink.bind_track(Arc::new(track));
//! sink.start();
//!
//! sink.input().send(ReleasePair::new(frame))?;
//! ```

pub mod config;
pub mod encoder;
pub mod mailbox;
pub mod pipeline;
pub mod track;

pub use config::SinkConfig;
pub use encoder::{Encoder, EncoderFactory};
pub use mailbox::SinkInput;
pub use pipeline::Sink;
pub use track::{ChannelTrack, TransportTrack};
