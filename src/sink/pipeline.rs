//! Sink implementation
//!
//! A sink takes units from its input slot at a bounded rate, encodes them and
//! writes the encoded bytes to every bound track. Two loops drive it, plus one
//! writer task per bound track:
//!
//! ```text
//!   SinkInput::send ──► [mailbox] ──tick──► encode loop ──► [output queue] ──► write loop
//!                        latest-wins       1/target_rate       bounded mpsc        │
//!                                                                                  ▼
//!                                                  [track queue] ──► track writer ──► track
//!                                                  one per track, full = drop
//! ```
//!
//! A stalled track only loses its own samples; it never holds up the other
//! tracks or `stop`.
//!
//! The encode loop owns the encoder and rebuilds it whenever the unit shape
//! changes. A failed rebuild stops the sink; a failed encode only drops the unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::media::Shaped;
use crate::stats::{SinkCounters, SinkStats};

use super::config::SinkConfig;
use super::encoder::{Encoder, EncoderFactory};
use super::mailbox::{Mailbox, SinkInput};
use super::track::TransportTrack;

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

type TrackList = Arc<Mutex<Vec<Arc<dyn TransportTrack>>>>;

/// State shared between the sink handle and its tasks
struct Shared<T: Shaped> {
    name: Arc<str>,
    mailbox: Arc<Mailbox<T>>,
    tracks: TrackList,
    counters: Arc<SinkCounters>,
    shape: Mutex<Option<T::Shape>>,
    fatal: Mutex<Option<MediaError>>,
    shutdown: CancellationToken,
}

/// Rate-limited encode and fan-out pipeline for one stream
pub struct Sink<T: Shaped> {
    config: SinkConfig,
    factory: Arc<dyn EncoderFactory<T>>,
    shared: Arc<Shared<T>>,
    ready: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Shaped> Sink<T> {
    /// Create a sink. Nothing runs until `start`.
    ///
    /// An empty name is replaced with a generated one, and an empty MIME type
    /// with the factory's.
    pub fn new(mut config: SinkConfig, factory: Arc<dyn EncoderFactory<T>>) -> Result<Self> {
        if config.name.is_empty() {
            config.name = format!("stream-{}", NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed));
        }
        if config.mime_type.is_empty() {
            config.mime_type = factory.mime_type().to_string();
        }
        if config.mime_type.is_empty() {
            return Err(MediaError::InvalidConfig(format!(
                "stream {} has no MIME type",
                config.name
            )));
        }
        if config.target_rate == 0 {
            return Err(MediaError::InvalidConfig(format!(
                "stream {} has a zero target rate",
                config.name
            )));
        }

        let (ready, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            name: Arc::from(config.name.as_str()),
            mailbox: Arc::new(Mailbox::new()),
            tracks: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(SinkCounters::new()),
            shape: Mutex::new(None),
            fatal: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        Ok(Self {
            config,
            factory,
            shared,
            ready,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// MIME type of the encoded output
    pub fn mime_type(&self) -> &str {
        &self.config.mime_type
    }

    /// Effective configuration
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Handle for feeding units into this sink
    pub fn input(&self) -> SinkInput<T> {
        SinkInput::new(
            Arc::clone(&self.shared.name),
            Arc::clone(&self.shared.mailbox),
            Arc::clone(&self.shared.counters),
        )
    }

    /// Start the encode and write loops. Later calls do nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.ready.send_replace(true) {
            return;
        }

        let (output_tx, output_rx) = mpsc::channel(self.config.output_capacity);

        let encode = tokio::spawn(encode_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.factory),
            self.config.target_rate,
            output_tx,
        ));
        let write = tokio::spawn(write_loop(
            Arc::clone(&self.shared),
            output_rx,
            self.config.output_capacity,
        ));

        lock(&self.tasks).extend([encode, write]);

        tracing::info!(
            stream = %self.config.name,
            mime_type = %self.config.mime_type,
            target_rate = self.config.target_rate,
            "Sink started"
        );
    }

    /// Resolves once `start` has been called
    pub async fn streaming_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so this only ends when ready.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Whether `start` has been called
    pub fn is_started(&self) -> bool {
        *self.ready.borrow()
    }

    /// Whether the loops are still running
    pub fn is_running(&self) -> bool {
        lock(&self.tasks).iter().any(|t| !t.is_finished())
    }

    /// Stop both loops, close the encoder and reject further input
    pub async fn stop(&self) {
        self.shared.shutdown.cancel();
        self.shared.mailbox.close();

        let tasks: Vec<_> = lock(&self.tasks).drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(stream = %self.config.name, error = %e, "Sink task ended abnormally");
            }
        }

        tracing::info!(stream = %self.config.name, "Sink stopped");
    }

    /// Bind a track. Returns false if a track with the same id is already bound.
    pub fn bind_track(&self, track: Arc<dyn TransportTrack>) -> bool {
        let mut tracks = lock(&self.shared.tracks);
        if tracks.iter().any(|t| t.id() == track.id()) {
            return false;
        }

        tracing::debug!(stream = %self.config.name, track = %track.id(), "Track bound");
        tracks.push(track);
        true
    }

    /// Unbind the track with `id`. Returns false if it was not bound.
    pub fn unbind_track(&self, id: &str) -> bool {
        let mut tracks = lock(&self.shared.tracks);
        let before = tracks.len();
        tracks.retain(|t| t.id() != id);

        let removed = tracks.len() != before;
        if removed {
            tracing::debug!(stream = %self.config.name, track = %id, "Track unbound");
        }
        removed
    }

    /// Number of bound tracks
    pub fn track_count(&self) -> usize {
        lock(&self.shared.tracks).len()
    }

    /// Shape the current encoder was built for
    pub fn current_shape(&self) -> Option<T::Shape> {
        *lock(&self.shared.shape)
    }

    /// The error that stopped the encode loop, if any
    pub fn fatal_error(&self) -> Option<MediaError> {
        lock(&self.shared.fatal).clone()
    }

    /// Get sink statistics
    pub fn stats(&self) -> SinkStats {
        self.shared.counters.snapshot(&self.config.name)
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn encode_loop<T: Shaped>(
    shared: Arc<Shared<T>>,
    factory: Arc<dyn EncoderFactory<T>>,
    target_rate: u32,
    output: mpsc::Sender<Bytes>,
) {
    let period = Duration::from_secs(1) / target_rate;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut encoder: Option<Box<dyn Encoder<T>>> = None;
    let mut shape: Option<T::Shape> = None;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Dropping `pair` releases it, on every path out of this iteration.
        let waiting_since = Instant::now();
        let Some(pair) = shared.mailbox.recv(&shared.shutdown).await else {
            break;
        };
        // After an idle stretch the next tick would already be due; restart
        // the period here so resumed input is still spaced 1/target_rate apart.
        if waiting_since.elapsed() >= period {
            ticker.reset();
        }
        SinkCounters::incr(&shared.counters.received);

        if pair.unit.is_empty() {
            continue;
        }

        let new_shape = pair.unit.shape();
        if shape != Some(new_shape) {
            if let Some(mut old) = encoder.take() {
                old.close();
            }

            tracing::info!(stream = %shared.name, shape = %new_shape, "Detected new shape");

            match factory.new_encoder(new_shape, target_rate) {
                Ok(fresh) => {
                    encoder = Some(fresh);
                    shape = Some(new_shape);
                    *lock(&shared.shape) = shape;
                    SinkCounters::incr(&shared.counters.encoder_inits);
                }
                Err(e) => {
                    let err = MediaError::ShapeReinit(format!("{}: {}", new_shape, e));
                    tracing::error!(stream = %shared.name, error = %err, "Sink halted");
                    *lock(&shared.fatal) = Some(err);
                    *lock(&shared.shape) = None;
                    break;
                }
            }
        }

        let Some(mut active) = encoder.take() else {
            break;
        };
        let unit = Arc::clone(&pair.unit);
        let (active, result) = match tokio::task::spawn_blocking(move || {
            let result = active.encode(&unit);
            (active, result)
        })
        .await
        {
            Ok(done) => done,
            Err(e) => {
                let err = MediaError::Encode(format!("encoder task failed: {}", e));
                tracing::error!(stream = %shared.name, error = %err, "Sink halted");
                *lock(&shared.fatal) = Some(err);
                break;
            }
        };
        encoder = Some(active);
        drop(pair);

        match result {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                SinkCounters::incr(&shared.counters.encoded);
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    sent = output.send(bytes) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(_) => SinkCounters::incr(&shared.counters.encoded),
            Err(e) => {
                SinkCounters::incr(&shared.counters.encode_errors);
                tracing::warn!(stream = %shared.name, error = %e, "Encode failed, unit dropped");
            }
        }
    }

    if let Some(mut active) = encoder {
        active.close();
    }
    shared.mailbox.close();

    tracing::debug!(stream = %shared.name, "Encode loop exited");
}

/// Writer task and queue for one bound track
struct TrackWriter {
    track: Arc<dyn TransportTrack>,
    queue: mpsc::Sender<Bytes>,
    task: JoinHandle<()>,
}

fn same_track(a: &Arc<dyn TransportTrack>, b: &Arc<dyn TransportTrack>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

async fn write_loop<T: Shaped>(
    shared: Arc<Shared<T>>,
    mut output: mpsc::Receiver<Bytes>,
    queue_capacity: usize,
) {
    let mut writers: HashMap<String, TrackWriter> = HashMap::new();
    let mut sent: u64 = 0;

    loop {
        let data = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            data = output.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let tracks: Vec<Arc<dyn TransportTrack>> = lock(&shared.tracks).clone();

        // Writers of unbound (or rebound) tracks stop right away
        writers.retain(|_, writer| {
            let bound = tracks.iter().any(|t| same_track(t, &writer.track));
            if !bound {
                writer.task.abort();
            }
            bound
        });

        for track in tracks {
            let writer = writers
                .entry(track.id().to_string())
                .or_insert_with(|| spawn_track_writer(&shared, track, queue_capacity));

            match writer.queue.try_send(data.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    SinkCounters::incr(&shared.counters.dropped_writes);
                    tracing::trace!(
                        stream = %shared.name,
                        track = %writer.track.id(),
                        "Track lagging, sample dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }

        sent += 1;
        tracing::trace!(stream = %shared.name, sent = sent, size = data.len(), "Queued sample");
    }

    // Closing the queues lets healthy writers drain; stalled ones end on shutdown
    let tasks: Vec<JoinHandle<()>> = writers.into_values().map(|w| w.task).collect();
    for task in tasks {
        let _ = task.await;
    }

    tracing::debug!(stream = %shared.name, "Write loop exited");
}

fn spawn_track_writer<T: Shaped>(
    shared: &Arc<Shared<T>>,
    track: Arc<dyn TransportTrack>,
    capacity: usize,
) -> TrackWriter {
    let (queue, mut pending) = mpsc::channel::<Bytes>(capacity);
    let name = Arc::clone(&shared.name);
    let counters = Arc::clone(&shared.counters);
    let shutdown = shared.shutdown.clone();
    let writer_track = Arc::clone(&track);

    let task = tokio::spawn(async move {
        loop {
            let data = tokio::select! {
                biased;
                data = pending.recv() => match data {
                    Some(data) => data,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let size = data.len() as u64;
            let result = tokio::select! {
                biased;
                result = writer_track.write(data) => result,
                _ = shutdown.cancelled() => break,
            };

            match result {
                Ok(()) => {
                    counters.bytes_written.fetch_add(size, Ordering::Relaxed);
                }
                Err(e) => {
                    SinkCounters::incr(&counters.write_errors);
                    tracing::warn!(
                        stream = %name,
                        track = %writer_track.id(),
                        error = %e,
                        "Track write failed"
                    );
                }
            }
        }

        tracing::trace!(stream = %name, track = %writer_track.id(), "Track writer exited");
    });

    TrackWriter { track, queue, task }
}
