//! Source-to-sink pump
//!
//! Drives one consumer handle on a media source into a sink's input until
//! the caller cancels, the sink stops, or the error policy gives up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::media::{ReleasePair, Shaped};
use crate::sink::Sink;
use crate::source::MediaSource;

use super::config::BackoffConfig;
use super::policy::{BackoffPolicy, ErrorAction, ErrorPolicy};

/// Pump `source` into `sink` with the default backoff policy
pub async fn stream_source<T, P>(
    source: &MediaSource<T, P>,
    format: &str,
    sink: &Sink<T>,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Shaped,
{
    stream_source_with_policy(source, format, sink, BackoffPolicy::default(), cancel).await
}

/// Pump `source` into `sink`, backing off as `backoff` describes
pub async fn stream_source_with_backoff<T, P>(
    source: &MediaSource<T, P>,
    format: &str,
    sink: &Sink<T>,
    backoff: BackoffConfig,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Shaped,
{
    stream_source_with_policy(source, format, sink, BackoffPolicy::new(backoff), cancel).await
}

/// Pump `source` into `sink`, consulting `policy` on every read error
///
/// Waits for the sink to be started before opening a handle. Returns `Ok`
/// when `cancel` fires or the sink stops, and the read error when the
/// policy returns `Stop` or the source is closed underneath the pump.
pub async fn stream_source_with_policy<T, P, E>(
    source: &MediaSource<T, P>,
    format: &str,
    sink: &Sink<T>,
    mut policy: E,
    cancel: &CancellationToken,
) -> Result<()>
where
    T: Shaped,
    E: ErrorPolicy,
{
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        _ = sink.streaming_ready() => {}
    }

    let mut stream = source.stream(format).await?;
    let input = sink.input();

    tracing::debug!(stream = %sink.name(), format = %format, "Pump started");

    let result = loop {
        let unit: Arc<T> = match stream.next_with_cancel(cancel).await {
            Ok(unit) => unit,
            Err(_) if cancel.is_cancelled() => break Ok(()),
            Err(e @ (MediaError::Cancelled | MediaError::Closed)) => break Err(e),
            Err(e) => match policy.on_error(&e) {
                ErrorAction::Skip => continue,
                ErrorAction::Backoff(wait) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(wait) => continue,
                    }
                }
                ErrorAction::Stop => break Err(e),
            },
        };
        policy.on_success();

        match input.send(ReleasePair::new(unit)) {
            Ok(()) => {}
            Err(MediaError::SinkStopped(_)) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    stream.close().await?;

    match &result {
        Ok(()) => tracing::debug!(stream = %sink.name(), format = %format, "Pump finished"),
        Err(e) => tracing::warn!(stream = %sink.name(), format = %format, error = %e, "Pump failed"),
    }
    result
}
