//! Broadcast engine
//!
//! Turns one blocking reader into a live feed shared by many consumers. A
//! single production task runs per engine and only reads when at least one
//! consumer has asked for a unit; every consumer waiting on that cycle sees the
//! same result.
//!
//! # Monitor
//!
//! ```text
//!   consumer next()                         production task
//!   ───────────────                         ───────────────
//!   lock; interested += 1                   lock; interested == 0? ──► wait(producer_wait)
//!   target = started + 1                    demand = take(interested); started += 1
//!   notify(producer_wait) ────────────────► unlock; read(ctx) (blocking, no lock held)
//!   wait(consumer_wait) until               lock; current = unit; posted = started
//!     posted >= target                      notify(consumer_wait); release(previous)
//! ```
//!
//! A consumer that registers while a read is in flight targets the following
//! cycle, so it never receives a unit whose read started before it asked.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::media::{MediaReader, MediaUnit, ReadContext, ReleaseFn};
use crate::stats::{EngineCounters, EngineStats};

use super::stream::MediaStream;

/// Callback receiving every read error of the engine a handle is attached to
pub type ErrorHandler = Arc<dyn Fn(&MediaError) + Send + Sync>;

/// Reader shared by all engines of one source; the mutex serializes reads
pub(crate) type SharedReader<T> = Arc<Mutex<Box<dyn MediaReader<T>>>>;

/// Last posted result
enum Current<T> {
    Unit(Arc<T>),
    Failed(MediaError),
}

impl<T> Current<T> {
    fn load(&self) -> Result<Arc<T>> {
        match self {
            Current::Unit(data) => Ok(Arc::clone(data)),
            Current::Failed(err) => Err(err.clone()),
        }
    }
}

struct EngineState<T> {
    current: Option<Current<T>>,
    /// Release callback of `current`, run when it is superseded
    release: Option<ReleaseFn>,
    interested: usize,
    /// Cycles that have taken a demand snapshot
    started: u64,
    /// Last cycle whose result is in `current`
    posted: u64,
    listeners: usize,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Single-producer/multi-consumer core for one (source, format) pair
pub struct BroadcastEngine<T> {
    format: String,
    reader: SharedReader<T>,
    root: CancellationToken,
    state: Mutex<EngineState<T>>,
    producer_wait: Notify,
    consumer_wait: Notify,
    /// Held by the production task for its whole life
    run_slot: tokio::sync::Mutex<()>,
    handlers: Mutex<HashMap<u64, Vec<ErrorHandler>>>,
    next_id: AtomicU64,
    counters: EngineCounters,
}

impl<T> BroadcastEngine<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(format: &str, reader: SharedReader<T>, root: CancellationToken) -> Self {
        let cancel = root.child_token();
        Self {
            format: format.to_string(),
            reader,
            root,
            state: Mutex::new(EngineState {
                current: None,
                release: None,
                interested: 0,
                started: 0,
                posted: 0,
                listeners: 0,
                cancel,
                task: None,
            }),
            producer_wait: Notify::new(),
            consumer_wait: Notify::new(),
            run_slot: tokio::sync::Mutex::new(()),
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: EngineCounters::default(),
        }
    }

    /// Format key this engine serves
    pub fn format(&self) -> &str {
        &self.format
    }

    fn lock(&self) -> MutexGuard<'_, EngineState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handlers(&self) -> MutexGuard<'_, HashMap<u64, Vec<ErrorHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new consumer, starting production if it is the first one
    pub(crate) fn attach(self: &Arc<Self>, handlers: Vec<ErrorHandler>) -> MediaStream<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if !handlers.is_empty() {
            self.lock_handlers().insert(id, handlers);
        }

        let mut state = self.lock();
        state.listeners += 1;
        let cancel = state.cancel.child_token();

        if state.listeners == 1 {
            let engine = Arc::clone(self);
            let epoch = state.cancel.clone();
            state.task = Some(tokio::spawn(engine.produce(epoch)));

            tracing::info!(format = %self.format, "Broadcast engine started");
        } else {
            tracing::debug!(
                format = %self.format,
                listeners = state.listeners,
                "Consumer attached"
            );
        }

        MediaStream::new(Arc::clone(self), id, cancel)
    }

    /// Deregister a consumer. Returns the production task if it was the last one.
    pub(crate) fn detach(&self, id: u64) -> Option<JoinHandle<()>> {
        self.lock_handlers().remove(&id);

        let mut state = self.lock();
        state.listeners = state.listeners.saturating_sub(1);
        if state.listeners > 0 {
            tracing::debug!(
                format = %self.format,
                listeners = state.listeners,
                "Consumer detached"
            );
            return None;
        }

        let task = self.stop_locked(&mut state);
        drop(state);
        self.wake_all();

        tracing::info!(format = %self.format, "Broadcast engine idle");

        task
    }

    /// Stop production for good and release the current unit
    pub(crate) async fn shutdown(&self) {
        let (task, release) = {
            let mut state = self.lock();
            let task = self.stop_locked(&mut state);
            state.current = None;
            (task, state.release.take())
        };
        self.wake_all();

        if let Some(task) = task {
            let _ = task.await;
        }
        if let Some(release) = release {
            release();
        }
    }

    /// Cancel the running epoch and arm a fresh token for the next start
    fn stop_locked(&self, state: &mut EngineState<T>) -> Option<JoinHandle<()>> {
        state.cancel.cancel();
        state.cancel = self.root.child_token();
        state.interested = 0;
        state.task.take()
    }

    fn wake_all(&self) {
        self.producer_wait.notify_waiters();
        self.consumer_wait.notify_waiters();
    }

    /// Wait for the first unit produced after this call
    pub(crate) async fn next(
        &self,
        handle: &CancellationToken,
        caller: Option<&CancellationToken>,
    ) -> Result<Arc<T>> {
        let target = {
            let mut state = self.lock();
            if handle.is_cancelled() || caller.is_some_and(|c| c.is_cancelled()) {
                return Err(MediaError::Cancelled);
            }
            state.interested += 1;
            state.started + 1
        };
        self.producer_wait.notify_waiters();

        loop {
            let notified = self.consumer_wait.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.lock();
                if state.posted >= target {
                    if let Some(current) = &state.current {
                        return current.load();
                    }
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = handle.cancelled() => {
                    self.withdraw(target);
                    return Err(MediaError::Cancelled);
                }
                _ = cancelled_or_pending(caller) => {
                    self.withdraw(target);
                    return Err(MediaError::Cancelled);
                }
            }
        }
    }

    /// Drop interest that no cycle has picked up yet
    fn withdraw(&self, target: u64) {
        let mut state = self.lock();
        if state.started < target && state.interested > 0 {
            state.interested -= 1;
        }
    }

    async fn produce(self: Arc<Self>, epoch: CancellationToken) {
        // A previous epoch's task may still be finishing its last read.
        let _slot = self.run_slot.lock().await;

        tracing::debug!(format = %self.format, "Production task running");

        while let Some(demand) = self.wait_for_demand(&epoch).await {
            let reader = Arc::clone(&self.reader);
            let ctx = ReadContext::new(self.format.as_str(), epoch.clone());
            let result = match tokio::task::spawn_blocking(move || {
                let mut reader = reader.lock().unwrap_or_else(PoisonError::into_inner);
                reader.read(&ctx)
            })
            .await
            {
                Ok(result) => result,
                Err(e) => Err(MediaError::read(format!("reader task failed: {}", e))),
            };

            if !self.post(&epoch, result) {
                break;
            }

            tracing::trace!(format = %self.format, demand = demand, "Cycle posted");
        }

        tracing::debug!(format = %self.format, "Production task exited");
    }

    /// Park until a consumer is interested. `None` means the epoch was cancelled.
    async fn wait_for_demand(&self, epoch: &CancellationToken) -> Option<usize> {
        loop {
            let notified = self.producer_wait.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if epoch.is_cancelled() {
                    return None;
                }
                if state.interested > 0 {
                    state.started += 1;
                    return Some(std::mem::take(&mut state.interested));
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = epoch.cancelled() => return None,
            }
        }
    }

    /// Store a read result as current and wake consumers.
    ///
    /// Returns false if the epoch was cancelled while reading; the result is
    /// then discarded.
    fn post(&self, epoch: &CancellationToken, result: Result<MediaUnit<T>>) -> bool {
        let mut state = self.lock();
        if epoch.is_cancelled() {
            drop(state);
            if let Ok(MediaUnit {
                release: Some(release),
                ..
            }) = result
            {
                release();
            }
            return false;
        }

        let superseded = state.release.take();
        let failure = match result {
            Ok(unit) => {
                state.current = Some(Current::Unit(Arc::new(unit.data)));
                state.release = unit.release;
                self.counters.reads.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                state.current = Some(Current::Failed(err.clone()));
                self.counters.read_errors.fetch_add(1, Ordering::Relaxed);
                Some(err)
            }
        };
        state.posted = state.started;
        drop(state);

        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        // Handlers see the error before any waiter returns it
        if let Some(err) = failure {
            tracing::debug!(format = %self.format, error = %err, "Read failed");
            self.dispatch_error(&err);
        }
        self.consumer_wait.notify_waiters();

        if let Some(release) = superseded {
            release();
        }

        true
    }

    fn dispatch_error(&self, err: &MediaError) {
        let handlers: Vec<ErrorHandler> = self
            .lock_handlers()
            .values()
            .flatten()
            .cloned()
            .collect();

        for handler in handlers {
            handler(err);
        }
    }

    /// Number of live consumer handles
    pub fn listeners(&self) -> usize {
        self.lock().listeners
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStats {
        let state = self.lock();
        let running = state.task.as_ref().is_some_and(|t| !t.is_finished());
        self.counters
            .snapshot(&self.format, state.listeners, running)
    }
}

impl<T> Drop for BroadcastEngine<T> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(release) = state.release.take() {
            release();
        }
    }
}

fn cancelled_or_pending(token: Option<&CancellationToken>) -> impl Future<Output = ()> + '_ {
    async move {
        match token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
