//! Transport tracks
//!
//! A track is the last hop before the network: whatever carries encoded bytes
//! to one remote viewer. Many tracks may be bound to one sink.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::BoxError;

/// Destination for encoded payloads
#[async_trait]
pub trait TransportTrack: Send + Sync + 'static {
    /// Identifier unique among the tracks bound to one sink
    fn id(&self) -> &str;

    /// Write one encoded payload. Order is preserved per track.
    async fn write(&self, data: Bytes) -> Result<(), BoxError>;
}

/// Track that forwards payloads into a bounded channel
///
/// Useful to hand a sink's output to a session task that owns the socket.
pub struct ChannelTrack {
    id: String,
    tx: mpsc::Sender<Bytes>,
}

impl ChannelTrack {
    /// Create a track and the receiver its payloads arrive on
    pub fn new(id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id: id.into(), tx }, rx)
    }
}

#[async_trait]
impl TransportTrack for ChannelTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write(&self, data: Bytes) -> Result<(), BoxError> {
        self.tx
            .send(data)
            .await
            .map_err(|_| format!("track {} receiver dropped", self.id).into())
    }
}
