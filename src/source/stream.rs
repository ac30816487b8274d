//! Consumer handle
//!
//! A `MediaStream` is one client's cursor into a broadcast engine. Calls to
//! `next` on one handle are sequential (enforced by `&mut self`); any number
//! of handles may wait on the same engine concurrently.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};

use super::engine::BroadcastEngine;

/// Per-client handle on a broadcast engine
pub struct MediaStream<T>
where
    T: Send + Sync + 'static,
{
    engine: Arc<BroadcastEngine<T>>,
    id: u64,
    cancel: CancellationToken,
    closed: bool,
}

impl<T> MediaStream<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(engine: Arc<BroadcastEngine<T>>, id: u64, cancel: CancellationToken) -> Self {
        Self {
            engine,
            id,
            cancel,
            closed: false,
        }
    }

    /// Wait for the next unit produced after this call.
    ///
    /// The unit is shared with every other handle served by the same cycle
    /// and must be cloned before mutation. Fails with `Cancelled` if the
    /// engine stops or the source closes, and `Closed` after `close`.
    pub async fn next(&mut self) -> Result<Arc<T>> {
        if self.closed {
            return Err(MediaError::Closed);
        }
        self.engine.next(&self.cancel, None).await
    }

    /// Like `next`, but also gives up when `cancel` fires
    pub async fn next_with_cancel(&mut self, cancel: &CancellationToken) -> Result<Arc<T>> {
        if self.closed {
            return Err(MediaError::Closed);
        }
        self.engine.next(&self.cancel, Some(cancel)).await
    }

    /// Format key of the engine this handle reads from
    pub fn format(&self) -> &str {
        self.engine.format()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Detach from the engine.
    ///
    /// Deregisters this handle's error handlers. If it was the last handle,
    /// the production task is stopped and awaited. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cancel.cancel();

        if let Some(task) = self.engine.detach(self.id) {
            if let Err(e) = task.await {
                tracing::warn!(
                    format = %self.engine.format(),
                    error = %e,
                    "Production task ended abnormally"
                );
            }
        }

        Ok(())
    }
}

impl<T> Drop for MediaStream<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.closed {
            self.cancel.cancel();
            // The task observes its cancelled epoch and exits on its own.
            let _ = self.engine.detach(self.id);
        }
    }
}

impl<T> std::fmt::Debug for MediaStream<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("format", &self.engine.format())
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::media::{MediaReader, MediaUnit, ReadContext};

    fn engine(reads: Arc<AtomicUsize>) -> Arc<BroadcastEngine<usize>> {
        let reader = move |_: &ReadContext| -> Result<MediaUnit<usize>> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(MediaUnit::new(reads.fetch_add(1, Ordering::SeqCst) + 1))
        };
        Arc::new(BroadcastEngine::new(
            "video/raw",
            Arc::new(Mutex::new(Box::new(reader) as Box<dyn MediaReader<usize>>)),
            CancellationToken::new(),
        ))
    }

    #[tokio::test]
    async fn test_next_after_close_fails() {
        let engine = engine(Arc::default());
        let mut stream = engine.attach(Vec::new());
        assert_eq!(*stream.next().await.unwrap(), 1);

        stream.close().await.unwrap();
        assert!(stream.is_closed());

        assert!(matches!(stream.next().await, Err(MediaError::Closed)));
        let cancel = CancellationToken::new();
        assert!(matches!(
            stream.next_with_cancel(&cancel).await,
            Err(MediaError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let engine = engine(Arc::default());
        let mut stream = engine.attach(Vec::new());
        stream.next().await.unwrap();

        assert!(stream.close().await.is_ok());
        assert!(stream.close().await.is_ok());
        assert_eq!(engine.listeners(), 0);
        assert!(!engine.stats().running);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let reads = Arc::new(AtomicUsize::new(0));
        let engine = engine(Arc::clone(&reads));
        let mut stream = engine.attach(Vec::new());
        let other = engine.attach(Vec::new());
        stream.next().await.unwrap();
        assert_eq!(engine.listeners(), 2);

        drop(stream);
        assert_eq!(engine.listeners(), 1);
        drop(other);
        assert_eq!(engine.listeners(), 0);

        while engine.stats().running {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let settled = reads.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reads.load(Ordering::SeqCst), settled);

        // A fresh handle starts a new production task
        let mut again = engine.attach(Vec::new());
        assert!(*again.next().await.unwrap() > settled);
        again.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_debug_and_format() {
        let engine = engine(Arc::default());
        let stream = engine.attach(Vec::new());

        assert_eq!(stream.format(), "video/raw");
        assert!(format!("{:?}", stream).contains("video/raw"));
    }
}
