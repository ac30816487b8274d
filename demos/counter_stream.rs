//! Counter stream demo
//!
//! Run with: cargo run --example counter_stream [SECONDS]
//!
//! A fake camera produces frames stamped with an increasing counter. Two
//! viewers share one engine; a sink encodes the latest frame at 10 fps and
//! hands the bytes to two logging tracks.
//!
//! Set RUST_LOG=media_fanout=debug for per-cycle detail.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use media_fanout::media::{VideoProps, VideoShape};
use media_fanout::sink::ChannelTrack;
use media_fanout::{
    stream_source, BoxError, Encoder, EncoderFactory, MediaUnit, ReadContext, Result,
    SinkConfig, StreamServer, VideoFrame, VideoSource,
};

/// Encodes a frame as its counter, big-endian
struct CounterEncoder;

impl Encoder<VideoFrame> for CounterEncoder {
    fn encode(&mut self, frame: &VideoFrame) -> std::result::Result<Option<Bytes>, BoxError> {
        Ok(Some(Bytes::copy_from_slice(&frame.timestamp.to_be_bytes())))
    }
}

struct CounterFactory;

impl EncoderFactory<VideoFrame> for CounterFactory {
    fn new_encoder(
        &self,
        shape: VideoShape,
        target_rate: u32,
    ) -> std::result::Result<Box<dyn Encoder<VideoFrame>>, BoxError> {
        println!("Encoder built for {} at {} fps", shape, target_rate);
        Ok(Box::new(CounterEncoder))
    }

    fn mime_type(&self) -> &str {
        "video/x-counter"
    }
}

fn counter(data: &Bytes) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&data[..8]);
    u64::from_be_bytes(raw)
}

#[tokio::main]
async fn main() -> std::result::Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("media_fanout=info")),
        )
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    // Fake camera: 60 fps, blocking
    let mut n = 0u64;
    let camera = move |_: &ReadContext| -> Result<MediaUnit<VideoFrame>> {
        std::thread::sleep(Duration::from_millis(16));
        n += 1;
        Ok(MediaUnit::new(VideoFrame::blank(4, 4).with_timestamp(n)))
    };
    let source = Arc::new(VideoSource::new(camera, VideoProps::new(4, 4, 60.0)));

    let server = StreamServer::default();
    let sink = server.new_stream(
        SinkConfig::with_name("counter").target_rate(10),
        Arc::new(CounterFactory),
    )?;

    let mut viewers = Vec::new();
    for id in ["alice", "bob"] {
        let (track, mut rx) = ChannelTrack::new(id, 4);
        sink.bind_track(Arc::new(track));
        viewers.push(tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                println!("[{}] frame {}", id, counter(&data));
            }
        }));
    }

    // A direct consumer alongside the pump shares the same engine
    let watcher = {
        let source = Arc::clone(&source);
        tokio::spawn(async move {
            let mut stream = source.stream("").await?;
            let mut last = 0;
            for _ in 0..5 {
                let frame = stream.next().await?;
                assert!(frame.timestamp > last);
                last = frame.timestamp;
            }
            stream.close().await
        })
    };

    let cancel = CancellationToken::new();
    let pump = {
        let source = Arc::clone(&source);
        let sink = Arc::clone(&sink);
        let cancel = cancel.clone();
        tokio::spawn(async move { stream_source(&source, "", &sink, &cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(seconds)).await;
    cancel.cancel();

    pump.await??;
    watcher.await??;
    server.close().await;
    source.close().await?;

    // Dropping the tracks ends the viewer loops
    for id in ["alice", "bob"] {
        sink.unbind_track(id);
    }
    for viewer in viewers {
        viewer.await?;
    }

    let stats = sink.stats();
    println!(
        "Stats: received={} superseded={} encoded={} bytes={}",
        stats.received, stats.superseded, stats.encoded, stats.bytes_written
    );

    Ok(())
}
