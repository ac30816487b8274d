//! Stream server
//!
//! Groups sinks under unique names so transports can look a stream up by
//! name and bind their tracks to it.
//!
//! ```text
//!   StreamServer
//!   ├── "camera-front" ─► Sink<VideoFrame>
//!   ├── "camera-rear"  ─► Sink<VideoFrame>
//!   └── "microphone"   ─► Sink<AudioChunk>
//! ```

pub mod config;
pub mod stream_server;

pub use config::ServerConfig;
pub use stream_server::{ManagedStream, StreamServer};
