//! Read error policies
//!
//! A policy sees every read error the pump receives and decides what happens
//! next. Success resets whatever state it keeps.

use std::time::Duration;

use crate::error::MediaError;

use super::config::BackoffConfig;

/// What the pump does after a read error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Drop the error and read again
    Skip,
    /// Sleep, then read again
    Backoff(Duration),
    /// End the pump with the error
    Stop,
}

/// Consumer-supplied reaction to read errors
pub trait ErrorPolicy: Send {
    /// Decide how to proceed after `err`
    fn on_error(&mut self, err: &MediaError) -> ErrorAction;

    /// Called after every successful read
    fn on_success(&mut self) {}
}

impl<F> ErrorPolicy for F
where
    F: FnMut(&MediaError) -> ErrorAction + Send,
{
    fn on_error(&mut self, err: &MediaError) -> ErrorAction {
        self(err)
    }
}

/// Default policy: exponential backoff on repeated identical errors
///
/// A run of identical errors sleeps longer each time and gives up once it
/// reaches `max_attempts`. A different error starts a new run.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    last: Option<MediaError>,
    count: u32,
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            last: None,
            count: 0,
        }
    }

    /// Length of the current run of identical errors
    pub fn consecutive(&self) -> u32 {
        self.count
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl ErrorPolicy for BackoffPolicy {
    fn on_error(&mut self, err: &MediaError) -> ErrorAction {
        match &self.last {
            Some(prev) if prev.same_as(err) => self.count = self.count.saturating_add(1),
            _ => {
                self.last = Some(err.clone());
                self.count = 1;
            }
        }

        if self.count >= self.config.max_attempts {
            tracing::warn!(error = %err, attempts = self.count, "Giving up after repeated read errors");
            return ErrorAction::Stop;
        }

        let sleep = self.config.sleep_for(self.count);
        tracing::debug!(error = %err, attempt = self.count, sleep_ms = sleep.as_millis() as u64, "Read failed, backing off");
        ErrorAction::Backoff(sleep)
    }

    fn on_success(&mut self) {
        self.last = None;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_err(msg: &str) -> MediaError {
        MediaError::read(msg.to_string())
    }

    #[test]
    fn test_backoff_grows_on_same_error() {
        let mut policy = BackoffPolicy::default();

        assert_eq!(
            policy.on_error(&read_err("busy")),
            ErrorAction::Backoff(Duration::from_millis(6))
        );
        assert_eq!(
            policy.on_error(&read_err("busy")),
            ErrorAction::Backoff(Duration::from_millis(36))
        );
        assert_eq!(policy.consecutive(), 2);
    }

    #[test]
    fn test_different_error_restarts_run() {
        let mut policy = BackoffPolicy::default();
        policy.on_error(&read_err("busy"));
        policy.on_error(&read_err("busy"));

        policy.on_error(&read_err("unplugged"));
        assert_eq!(policy.consecutive(), 1);
    }

    #[test]
    fn test_success_resets() {
        let mut policy = BackoffPolicy::default();
        policy.on_error(&read_err("busy"));
        policy.on_success();

        assert_eq!(policy.consecutive(), 0);
    }

    #[test]
    fn test_stops_at_max_attempts() {
        let mut policy = BackoffPolicy::new(BackoffConfig::default().max_attempts(3));

        assert!(matches!(policy.on_error(&read_err("x")), ErrorAction::Backoff(_)));
        assert!(matches!(policy.on_error(&read_err("x")), ErrorAction::Backoff(_)));
        assert_eq!(policy.on_error(&read_err("x")), ErrorAction::Stop);
    }

    #[test]
    fn test_closure_policy() {
        let mut seen = 0;
        let mut policy = |_: &MediaError| {
            seen += 1;
            ErrorAction::Skip
        };

        assert_eq!(policy.on_error(&MediaError::Closed), ErrorAction::Skip);
        drop(policy);
        assert_eq!(seen, 1);
    }
}
