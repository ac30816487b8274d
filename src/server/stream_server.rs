//! Named stream set
//!
//! The server owns a set of sinks keyed by stream name. Names are unique; a
//! second registration under the same name is refused. Closing the server
//! stops every stream it holds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{MediaError, Result};
use crate::media::Shaped;
use crate::sink::{EncoderFactory, Sink, SinkConfig};
use crate::stats::SinkStats;

use super::config::ServerConfig;

/// Type-erased view of a sink, so video and audio streams share one server
#[async_trait]
pub trait ManagedStream: Send + Sync + 'static {
    /// Stream name
    fn name(&self) -> &str;

    /// MIME type of the encoded output
    fn mime_type(&self) -> &str;

    /// Start the stream. Idempotent.
    fn start(&self);

    /// Stop the stream and wait for its tasks
    async fn stop(&self);

    /// Whether the stream's tasks are running
    fn is_running(&self) -> bool;

    /// Current statistics
    fn stats(&self) -> SinkStats;
}

#[async_trait]
impl<T: Shaped> ManagedStream for Sink<T> {
    fn name(&self) -> &str {
        Sink::name(self)
    }

    fn mime_type(&self) -> &str {
        Sink::mime_type(self)
    }

    fn start(&self) {
        Sink::start(self)
    }

    async fn stop(&self) {
        Sink::stop(self).await
    }

    fn is_running(&self) -> bool {
        Sink::is_running(self)
    }

    fn stats(&self) -> SinkStats {
        Sink::stats(self)
    }
}

#[derive(Default)]
struct Streams {
    ordered: Vec<Arc<dyn ManagedStream>>,
    by_name: HashMap<String, Arc<dyn ManagedStream>>,
}

/// Registry of named streams
pub struct StreamServer {
    config: ServerConfig,
    streams: RwLock<Streams>,
    closed: AtomicBool,
}

impl StreamServer {
    /// Create an empty server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            streams: RwLock::new(Streams::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a server holding `streams`
    ///
    /// Fails with `RegistrationConflict` if two of them share a name.
    pub fn with_streams(
        config: ServerConfig,
        streams: impl IntoIterator<Item = Arc<dyn ManagedStream>>,
    ) -> Result<Self> {
        let server = Self::new(config);
        for stream in streams {
            server.add_stream(stream)?;
        }
        Ok(server)
    }

    /// Build a sink and register it under its configured name
    ///
    /// With `auto_start` the sink is started before it is returned, which
    /// requires a Tokio runtime.
    pub fn new_stream<T: Shaped>(
        &self,
        config: SinkConfig,
        factory: Arc<dyn EncoderFactory<T>>,
    ) -> Result<Arc<Sink<T>>> {
        if !config.name.is_empty() && self.contains(&config.name) {
            return Err(MediaError::RegistrationConflict(config.name));
        }

        let sink = Arc::new(Sink::new(config, factory)?);
        let handle: Arc<dyn ManagedStream> = sink.clone();
        self.add_stream(handle)?;
        Ok(sink)
    }

    /// Register an existing stream
    pub fn add_stream(&self, stream: Arc<dyn ManagedStream>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MediaError::Closed);
        }

        {
            let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
            if streams.by_name.contains_key(stream.name()) {
                return Err(MediaError::RegistrationConflict(stream.name().to_string()));
            }
            if self.config.max_streams > 0 && streams.ordered.len() >= self.config.max_streams {
                return Err(MediaError::CapacityExceeded(self.config.max_streams));
            }

            streams
                .by_name
                .insert(stream.name().to_string(), Arc::clone(&stream));
            streams.ordered.push(Arc::clone(&stream));

            tracing::info!(
                stream = %stream.name(),
                mime_type = %stream.mime_type(),
                total = streams.ordered.len(),
                "Stream registered"
            );
        }

        if self.config.auto_start {
            stream.start();
        }
        Ok(())
    }

    /// Look up a stream by name
    pub fn stream(&self, name: &str) -> Option<Arc<dyn ManagedStream>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .get(name)
            .cloned()
    }

    /// Whether a stream is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .contains_key(name)
    }

    /// Names of all streams, in registration order
    pub fn stream_names(&self) -> Vec<String> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Number of registered streams
    pub fn len(&self) -> usize {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .len()
    }

    /// Check if no streams are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every stream. Further registrations fail with `Closed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let streams: Vec<_> = self
            .streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered
            .clone();

        for stream in &streams {
            stream.stop().await;
        }

        tracing::info!(streams = streams.len(), "Stream server closed");
    }
}

impl Default for StreamServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
