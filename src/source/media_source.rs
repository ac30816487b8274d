//! Media source implementation
//!
//! A `MediaSource` owns a reader and lazily creates one broadcast engine per
//! format key. Engines are never destroyed while the source lives, only idled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::media::{AudioChunk, AudioProps, MediaReader, VideoFrame, VideoProps};
use crate::registry::{Driver, ReleaseOutcome, ResourceRegistry};
use crate::stats::EngineStats;

use super::config::SourceConfig;
use super::engine::{BroadcastEngine, ErrorHandler, SharedReader};
use super::stream::MediaStream;

/// A source of video frames
pub type VideoSource = MediaSource<VideoFrame, VideoProps>;

/// A source of audio chunks
pub type AudioSource = MediaSource<AudioChunk, AudioProps>;

/// Driver reference held by a source
struct DriverRef {
    driver: Arc<dyn Driver>,
    registry: Arc<ResourceRegistry>,
}

/// Producer of media streams, keyed by format
pub struct MediaSource<T, P = ()>
where
    T: Send + Sync + 'static,
{
    driver: Option<DriverRef>,
    reader: SharedReader<T>,
    props: P,
    config: SourceConfig,
    root: CancellationToken,
    engines: Mutex<HashMap<String, Arc<BroadcastEngine<T>>>>,
    closed: AtomicBool,
}

impl<T, P> MediaSource<T, P>
where
    T: Send + Sync + 'static,
{
    /// Create a source that owns no driver
    pub fn new(reader: impl MediaReader<T>, props: P) -> Self {
        Self::with_config(reader, props, SourceConfig::default())
    }

    /// Create a source with custom configuration
    pub fn with_config(reader: impl MediaReader<T>, props: P, config: SourceConfig) -> Self {
        Self::build(None, Box::new(reader), props, config)
    }

    /// Create a source that references `driver` in the process-wide registry
    pub fn for_driver(
        driver: Arc<dyn Driver>,
        reader: impl MediaReader<T>,
        props: P,
    ) -> Result<Self> {
        Self::for_driver_in(
            ResourceRegistry::global(),
            driver,
            reader,
            props,
            SourceConfig::default(),
        )
    }

    /// Create a source that references `driver` in the given registry
    ///
    /// The driver is opened only if no other source holds its label.
    pub fn for_driver_in(
        registry: Arc<ResourceRegistry>,
        driver: Arc<dyn Driver>,
        reader: impl MediaReader<T>,
        props: P,
        config: SourceConfig,
    ) -> Result<Self> {
        let driver = registry.acquire_driver(driver)?;
        Ok(Self::build(
            Some(DriverRef { driver, registry }),
            Box::new(reader),
            props,
            config,
        ))
    }

    fn build(
        driver: Option<DriverRef>,
        reader: Box<dyn MediaReader<T>>,
        props: P,
        config: SourceConfig,
    ) -> Self {
        Self {
            driver,
            reader: Arc::new(Mutex::new(reader)),
            props,
            config,
            root: CancellationToken::new(),
            engines: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_engines(&self) -> MutexGuard<'_, HashMap<String, Arc<BroadcastEngine<T>>>> {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Source properties
    pub fn properties(&self) -> &P {
        &self.props
    }

    /// Label of the referenced driver, if any
    pub fn driver_label(&self) -> Option<&str> {
        self.driver.as_ref().map(|d| d.driver.label())
    }

    /// Open a consumer handle for `format`
    pub async fn stream(&self, format: &str) -> Result<MediaStream<T>> {
        self.stream_with_handlers(format, Vec::new()).await
    }

    /// Open a consumer handle for `format` with error handlers
    ///
    /// Each handler receives every read error of the engine until the handle
    /// is closed. The first handle on an engine starts its production task.
    pub async fn stream_with_handlers(
        &self,
        format: &str,
        handlers: Vec<ErrorHandler>,
    ) -> Result<MediaStream<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MediaError::Closed);
        }

        let engine = {
            let mut engines = self.lock_engines();
            match engines.get(format) {
                Some(engine) => Arc::clone(engine),
                None => {
                    if engines.len() >= self.config.max_engines {
                        return Err(MediaError::CapacityExceeded(self.config.max_engines));
                    }
                    let engine = Arc::new(BroadcastEngine::new(
                        format,
                        Arc::clone(&self.reader),
                        self.root.clone(),
                    ));
                    engines.insert(format.to_string(), Arc::clone(&engine));

                    tracing::debug!(format = %format, engines = engines.len(), "Engine created");
                    engine
                }
            }
        };

        Ok(engine.attach(handlers))
    }

    /// Number of engines created so far
    pub fn engine_count(&self) -> usize {
        self.lock_engines().len()
    }

    /// Statistics for the engine serving `format`
    pub fn engine_stats(&self, format: &str) -> Option<EngineStats> {
        self.lock_engines().get(format).map(|e| e.stats())
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop every engine, close the reader and release the driver.
    ///
    /// Outstanding handles fail with `Cancelled` from then on. Returns
    /// `ResourceInUse` if other sources still reference the driver; the
    /// caller decides whether that matters. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.root.cancel();

        let engines: Vec<_> = self.lock_engines().values().cloned().collect();
        for engine in engines {
            engine.shutdown().await;
        }

        let reader_result = {
            let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
            reader.close()
        };
        if let Err(ref e) = reader_result {
            tracing::warn!(error = %e, "Reader close failed");
        }

        let Some(DriverRef { driver, registry }) = &self.driver else {
            return reader_result;
        };

        match registry.release(driver.label())? {
            ReleaseOutcome::Released => reader_result,
            ReleaseOutcome::InUse(_) => Err(MediaError::ResourceInUse(driver.label().to_string())),
        }
    }
}

/// Read a single unit from `source`.
///
/// Opens a handle, waits for one unit and closes the handle again. Gives a
/// weaker ordering guarantee than holding a `MediaStream` across reads.
pub async fn read_media<T, P>(source: &MediaSource<T, P>, format: &str) -> Result<Arc<T>>
where
    T: Send + Sync + 'static,
{
    let mut stream = source.stream(format).await?;
    let result = stream.next().await;
    stream.close().await?;
    result
}
