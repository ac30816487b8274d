//! Latest-wins input slot
//!
//! Sits between whatever feeds a sink and the sink's rate loop. It holds at
//! most one pending pair: posting a new one releases the one it replaces, so
//! a stalled sink never blocks the producer and never builds a backlog.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{MediaError, Result};
use crate::media::ReleasePair;
use crate::stats::SinkCounters;

struct Slot<T> {
    pending: Option<ReleasePair<T>>,
    closed: bool,
}

pub(crate) struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pending pair. Returns the replaced pair, if any.
    fn post(&self, pair: ReleasePair<T>) -> std::result::Result<Option<ReleasePair<T>>, ReleasePair<T>> {
        let mut slot = self.lock();
        if slot.closed {
            return Err(pair);
        }
        let replaced = slot.pending.replace(pair);
        drop(slot);

        self.notify.notify_one();
        Ok(replaced)
    }

    /// Wait for a pending pair. `None` once closed or cancelled.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<ReleasePair<T>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut slot = self.lock();
                if let Some(pair) = slot.pending.take() {
                    return Some(pair);
                }
                if slot.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Reject further posts and release anything pending
    pub fn close(&self) {
        let pending = {
            let mut slot = self.lock();
            slot.closed = true;
            slot.pending.take()
        };
        self.notify.notify_waiters();
        drop(pending);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Handle for feeding units into a sink
///
/// Cheap to clone; all clones post into the same slot.
pub struct SinkInput<T> {
    name: Arc<str>,
    mailbox: Arc<Mailbox<T>>,
    counters: Arc<SinkCounters>,
}

impl<T> Clone for SinkInput<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            mailbox: Arc::clone(&self.mailbox),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<T> SinkInput<T> {
    pub(crate) fn new(name: Arc<str>, mailbox: Arc<Mailbox<T>>, counters: Arc<SinkCounters>) -> Self {
        Self {
            name,
            mailbox,
            counters,
        }
    }

    /// Hand a pair to the sink without waiting.
    ///
    /// A pair still waiting from an earlier call is released and replaced.
    /// Fails with `SinkStopped` once the sink has stopped; the rejected pair
    /// is released.
    pub fn send(&self, pair: ReleasePair<T>) -> Result<()> {
        match self.mailbox.post(pair) {
            Ok(Some(replaced)) => {
                SinkCounters::incr(&self.counters.superseded);
                drop(replaced);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(rejected) => {
                drop(rejected);
                Err(MediaError::SinkStopped(self.name.to_string()))
            }
        }
    }

    /// Whether the sink still accepts input
    pub fn is_open(&self) -> bool {
        !self.mailbox.is_closed()
    }
}
