//! End-to-end behaviour of sources, engines and sinks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use media_fanout::error::BoxError;
use media_fanout::media::{AudioProps, AudioShape, VideoProps, VideoShape};
use media_fanout::registry::{Driver, ResourceRegistry};
use media_fanout::sink::ChannelTrack;
use media_fanout::source::{ErrorHandler, SourceConfig};
use media_fanout::{
    stream_source, AudioChunk, AudioSource, Encoder, EncoderFactory, MediaError, MediaSource,
    MediaUnit, ReadContext, ReleasePair, Result, Sink, SinkConfig, VideoFrame, VideoSource,
};

/// Reader that hands out 1, 2, 3, ... and records overlapping calls
fn counter_source(read_time: Duration) -> (MediaSource<u64>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let reads = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));

    let (r, o) = (Arc::clone(&reads), Arc::clone(&overlap));
    let reader = move |_: &ReadContext| -> Result<MediaUnit<u64>> {
        if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            o.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(read_time);
        let n = r.fetch_add(1, Ordering::SeqCst) + 1;
        in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(MediaUnit::new(n as u64))
    };

    (MediaSource::new(reader, ()), reads, overlap)
}

/// Reader that blocks until the test lets a read through or the read is cancelled
fn gated_source() -> (MediaSource<u64>, mpsc::Sender<()>, Arc<AtomicUsize>) {
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let entered = Arc::new(AtomicUsize::new(0));

    let e = Arc::clone(&entered);
    let mut n = 0u64;
    let reader = move |ctx: &ReadContext| -> Result<MediaUnit<u64>> {
        e.fetch_add(1, Ordering::SeqCst);
        loop {
            match gate_rx.recv_timeout(Duration::from_millis(2)) {
                Ok(()) => break,
                Err(mpsc::RecvTimeoutError::Timeout) if !ctx.is_cancelled() => {}
                Err(mpsc::RecvTimeoutError::Timeout) => return Err(MediaError::Cancelled),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(MediaError::read("gate closed"))
                }
            }
        }
        n += 1;
        Ok(MediaUnit::new(n))
    };

    (MediaSource::new(reader, ()), gate_tx, entered)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    while !check() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_reader_for_concurrent_handles() {
    let (source, reads, overlap) = counter_source(Duration::from_millis(5));
    let source = Arc::new(source);

    let mut consumers = Vec::new();
    for _ in 0..8 {
        let source = Arc::clone(&source);
        consumers.push(tokio::spawn(async move {
            let mut stream = source.stream("raw").await.unwrap();
            let mut last = 0;
            for _ in 0..5 {
                let n = *stream.next().await.unwrap();
                assert!(n > last, "unit {} seen after {}", n, last);
                last = n;
            }
            stream.close().await.unwrap();
        }));
    }
    for consumer in consumers {
        consumer.await.unwrap();
    }

    let stats = source.engine_stats("raw").unwrap();
    assert_eq!(overlap.load(Ordering::SeqCst), 0);
    assert_eq!(stats.reads, reads.load(Ordering::SeqCst) as u64);
    assert_eq!(stats.cycles, stats.reads);
    assert!(stats.reads < 40);
}

#[tokio::test]
async fn test_same_cycle_same_unit() {
    let (source, gate, entered) = gated_source();
    let mut a = source.stream("").await.unwrap();
    let mut b = source.stream("").await.unwrap();
    let mut c = source.stream("").await.unwrap();

    let first = tokio::spawn(async move {
        let result = a.next().await;
        (result, a)
    });
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;

    // Both register while cycle 1 is in flight, so both land on cycle 2
    let second = tokio::spawn(async move {
        let result = b.next().await;
        (result, b)
    });
    let third = tokio::spawn(async move {
        let result = c.next().await;
        (result, c)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    gate.send(()).unwrap();
    let (ra, mut a) = first.await.unwrap();
    assert_eq!(*ra.unwrap(), 1);

    gate.send(()).unwrap();
    let (rb, mut b) = second.await.unwrap();
    let (rc, mut c) = third.await.unwrap();
    let (ub, uc) = (rb.unwrap(), rc.unwrap());

    assert_eq!(*ub, 2);
    assert!(Arc::ptr_eq(&ub, &uc));

    a.close().await.unwrap();
    b.close().await.unwrap();
    c.close().await.unwrap();
}

#[tokio::test]
async fn test_idle_engine_stops_and_restarts() {
    let (source, reads, _) = counter_source(Duration::from_millis(1));

    let mut stream = source.stream("").await.unwrap();
    let first = stream.next().await.unwrap();
    assert!(source.engine_stats("").unwrap().running);

    stream.close().await.unwrap();
    let stats = source.engine_stats("").unwrap();
    assert!(!stats.running);
    assert_eq!(stats.listeners, 0);

    let idle_reads = reads.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(reads.load(Ordering::SeqCst), idle_reads);

    let mut stream = source.stream("").await.unwrap();
    let second = stream.next().await.unwrap();
    assert!(*second > *first);
    assert_eq!(source.engine_count(), 1);
    stream.close().await.unwrap();
}

struct CountingDriver {
    label: String,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl Driver for CountingDriver {
    fn label(&self) -> &str {
        &self.label
    }

    fn open(&self) -> std::result::Result<(), BoxError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> std::result::Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_shared_device_closed_once() {
    let registry = Arc::new(ResourceRegistry::new());
    let driver = Arc::new(CountingDriver {
        label: "/dev/video0".to_string(),
        opens: AtomicUsize::new(0),
        closes: AtomicUsize::new(0),
    });
    let frames =
        |_: &ReadContext| -> Result<MediaUnit<VideoFrame>> { Ok(MediaUnit::new(VideoFrame::blank(2, 2))) };

    let front = VideoSource::for_driver_in(
        Arc::clone(&registry),
        driver.clone(),
        frames,
        VideoProps::new(2, 2, 30.0),
        SourceConfig::default(),
    )
    .unwrap();
    let rear = VideoSource::for_driver_in(
        Arc::clone(&registry),
        driver.clone(),
        frames,
        VideoProps::new(2, 2, 30.0),
        SourceConfig::default(),
    )
    .unwrap();
    assert_eq!(driver.opens.load(Ordering::SeqCst), 1);
    assert_eq!(registry.ref_count("/dev/video0"), 2);

    assert!(matches!(front.close().await, Err(MediaError::ResourceInUse(_))));
    assert_eq!(driver.closes.load(Ordering::SeqCst), 0);

    rear.close().await.unwrap();
    assert_eq!(driver.closes.load(Ordering::SeqCst), 1);
    assert!(!registry.contains("/dev/video0"));
}

#[tokio::test]
async fn test_read_errors_reach_every_consumer() {
    let source: MediaSource<u64> = MediaSource::new(
        |_: &ReadContext| -> Result<MediaUnit<u64>> { Err(MediaError::read("sensor offline")) },
        (),
    );

    let seen_a = Arc::new(AtomicUsize::new(0));
    let seen_b = Arc::new(AtomicUsize::new(0));
    let handler = |seen: &Arc<AtomicUsize>| -> ErrorHandler {
        let seen = Arc::clone(seen);
        Arc::new(move |err: &MediaError| {
            assert!(matches!(err, MediaError::Read(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };

    let mut a = source.stream_with_handlers("", vec![handler(&seen_a)]).await.unwrap();
    let mut b = source.stream_with_handlers("", vec![handler(&seen_b)]).await.unwrap();

    tokio::join!(
        async {
            for _ in 0..3 {
                assert!(matches!(a.next().await, Err(MediaError::Read(_))));
            }
        },
        async {
            for _ in 0..3 {
                assert!(matches!(b.next().await, Err(MediaError::Read(_))));
            }
        }
    );
    a.close().await.unwrap();
    b.close().await.unwrap();
    let cycles = source.engine_stats("").unwrap().read_errors as usize;

    assert!(cycles >= 3);
    assert_eq!(seen_a.load(Ordering::SeqCst), cycles);
    assert_eq!(seen_b.load(Ordering::SeqCst), cycles);
}

#[tokio::test]
async fn test_cancelled_next_returns_promptly() {
    let (source, gate, entered) = gated_source();
    let mut stream = source.stream("").await.unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_millis(500), stream.next_with_cancel(&cancel))
        .await
        .expect("next must not block after cancellation");
    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert_eq!(entered.load(Ordering::SeqCst), 1);

    // The read is still blocked on the gate; closing cancels it
    tokio::time::timeout(Duration::from_millis(500), stream.close())
        .await
        .expect("close must not wait for the blocked read")
        .unwrap();
    assert!(!source.engine_stats("").unwrap().running);
    drop(gate);
}

#[tokio::test]
async fn test_reader_sees_format_key() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reads);
    let source = MediaSource::new(
        move |ctx: &ReadContext| -> Result<MediaUnit<String>> {
            counter.fetch_add(1, Ordering::SeqCst);
            let encoded = match ctx.format() {
                "video/vp8" => "vp8",
                "video/h264" => "h264",
                _ => "raw",
            };
            Ok(MediaUnit::new(encoded.to_string()))
        },
        (),
    );

    let mut vp8 = source.stream("video/vp8").await.unwrap();
    let mut h264 = source.stream("video/h264").await.unwrap();
    let mut raw = source.stream("").await.unwrap();

    assert_eq!(vp8.next().await.unwrap().as_str(), "vp8");
    assert_eq!(h264.next().await.unwrap().as_str(), "h264");
    assert_eq!(raw.next().await.unwrap().as_str(), "raw");
    assert_eq!(reads.load(Ordering::SeqCst), 3);

    vp8.close().await.unwrap();
    h264.close().await.unwrap();
    raw.close().await.unwrap();
    source.close().await.unwrap();
}

#[tokio::test]
async fn test_later_consumer_never_goes_back() {
    let (source, _, _) = counter_source(Duration::from_millis(2));

    let mut a = source.stream("").await.unwrap();
    let seen_by_a = *a.next().await.unwrap();

    let mut b = source.stream("").await.unwrap();
    let seen_by_b = *b.next().await.unwrap();

    assert!(seen_by_a >= 1);
    assert!(seen_by_b > seen_by_a);

    a.close().await.unwrap();
    b.close().await.unwrap();
}

struct CountingEncoder(Arc<AtomicUsize>);

impl Encoder<VideoFrame> for CountingEncoder {
    fn encode(&mut self, _unit: &VideoFrame) -> std::result::Result<Option<Bytes>, BoxError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Bytes::from_static(b"frame")))
    }
}

struct CountingFactory(Arc<AtomicUsize>);

impl EncoderFactory<VideoFrame> for CountingFactory {
    fn new_encoder(
        &self,
        _shape: VideoShape,
        _target_rate: u32,
    ) -> std::result::Result<Box<dyn Encoder<VideoFrame>>, BoxError> {
        Ok(Box::new(CountingEncoder(Arc::clone(&self.0))))
    }

    fn mime_type(&self) -> &str {
        "video/x-count"
    }
}

#[tokio::test]
async fn test_encode_rate_is_bounded() {
    const RATE: u32 = 20;

    let encodes = Arc::new(AtomicUsize::new(0));
    let released = Arc::new(AtomicUsize::new(0));
    let sink = Sink::new(
        SinkConfig::with_name("bounded").target_rate(RATE),
        Arc::new(CountingFactory(Arc::clone(&encodes))),
    )
    .unwrap();
    let input = sink.input();

    let started = Instant::now();
    sink.start();

    let mut sent = 0;
    while started.elapsed() < Duration::from_millis(500) {
        let released = Arc::clone(&released);
        input
            .send(ReleasePair::with_release(
                Arc::new(VideoFrame::blank(2, 2)),
                move || {
                    released.fetch_add(1, Ordering::SeqCst);
                },
            ))
            .unwrap();
        sent += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    sink.stop().await;
    let elapsed = started.elapsed().as_secs_f64();

    let limit = (RATE as f64 * elapsed).floor() as usize + 1;
    let encoded = encodes.load(Ordering::SeqCst);
    assert!(encoded <= limit, "{} encodes in {:.3}s", encoded, elapsed);
    assert!(encoded > 0);
    assert_eq!(released.load(Ordering::SeqCst), sent);
}

struct ShapeEncoder;

impl Encoder<AudioChunk> for ShapeEncoder {
    fn encode(&mut self, unit: &AudioChunk) -> std::result::Result<Option<Bytes>, BoxError> {
        Ok(Some(Bytes::from(format!("{}:{}", unit.sample_rate, unit.frame_count()))))
    }
}

struct ShapeFactory(Arc<std::sync::Mutex<Vec<AudioShape>>>);

impl EncoderFactory<AudioChunk> for ShapeFactory {
    fn new_encoder(
        &self,
        shape: AudioShape,
        _target_rate: u32,
    ) -> std::result::Result<Box<dyn Encoder<AudioChunk>>, BoxError> {
        self.0.lock().unwrap().push(shape);
        Ok(Box::new(ShapeEncoder))
    }

    fn mime_type(&self) -> &str {
        "audio/x-test"
    }
}

#[tokio::test]
async fn test_audio_source_through_sink() {
    // Switches from stereo 48kHz to mono 16kHz after a few chunks
    let mut n = 0u32;
    let source = AudioSource::new(
        move |_: &ReadContext| -> Result<MediaUnit<AudioChunk>> {
            n += 1;
            let chunk = if n <= 3 {
                AudioChunk::new(48_000, 2, vec![0.0; 960])
            } else {
                AudioChunk::new(16_000, 1, vec![0.0; 160])
            };
            std::thread::sleep(Duration::from_millis(2));
            Ok(MediaUnit::new(chunk))
        },
        AudioProps::new(48_000, 2, Duration::from_millis(20)),
    );
    let built = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Sink::new(
        SinkConfig::with_name("mic").target_rate(200),
        Arc::new(ShapeFactory(Arc::clone(&built))),
    )
    .unwrap();
    let (track, mut rx) = ChannelTrack::new("speaker", 16);
    sink.bind_track(Arc::new(track));
    sink.start();

    let cancel = CancellationToken::new();
    let pump = stream_source(&source, "audio/pcm", &sink, &cancel);
    let watch = async {
        loop {
            let data = rx.recv().await.unwrap();
            if data == Bytes::from_static(b"16000:160") {
                break;
            }
        }
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(pump, watch);
    result.unwrap();
    sink.stop().await;

    let last = built.lock().unwrap().last().copied();
    assert_eq!(last.map(|s| s.to_string()), Some("16000Hz/1ch".to_string()));
    assert!(sink.stats().encoder_inits >= 1);
    source.close().await.unwrap();
}
