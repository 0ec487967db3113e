//! Bounded readiness polling.
//!
//! A freshly spawned daemon is not usable until its control socket appears.
//! The waiter checks for the socket at a fixed interval and gives up after a
//! fixed number of attempts; it never blocks indefinitely.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ReadinessConfig;
use crate::error::ReadinessTimeoutError;

/// Filesystem and clock access used while polling.
///
/// Swapped for a fake in tests so no real time passes.
pub trait Poller {
    fn path_exists(&self, path: &Path) -> bool;
    fn sleep(&self, duration: Duration);
}

/// Real filesystem and `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPoller;

impl Poller for SystemPoller {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// "Path P exists", checked at most `max_attempts` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCondition {
    pub path: PathBuf,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ReadinessCondition {
    pub fn path_exists(path: impl Into<PathBuf>, config: &ReadinessConfig) -> Self {
        Self {
            path: path.into(),
            interval: config.interval,
            max_attempts: config.max_attempts,
        }
    }
}

/// Waits for a readiness condition using an injectable poller.
#[derive(Debug, Clone, Default)]
pub struct ReadinessWaiter<P: Poller = SystemPoller> {
    poller: P,
}

impl ReadinessWaiter<SystemPoller> {
    pub fn system() -> Self {
        Self {
            poller: SystemPoller,
        }
    }
}

impl<P: Poller> ReadinessWaiter<P> {
    pub fn with_poller(poller: P) -> Self {
        Self { poller }
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    /// Block until the condition holds.
    ///
    /// Returns the 1-based attempt on which the path was observed. No sleep
    /// follows the final attempt, so the wait is bounded by
    /// `(max_attempts - 1) * interval`.
    pub fn wait(&self, condition: &ReadinessCondition) -> Result<u32, ReadinessTimeoutError> {
        for attempt in 1..=condition.max_attempts {
            if self.poller.path_exists(&condition.path) {
                tracing::debug!(
                    path = %condition.path.display(),
                    attempt = attempt,
                    "Readiness condition met"
                );
                return Ok(attempt);
            }
            if attempt < condition.max_attempts {
                self.poller.sleep(condition.interval);
            }
        }

        tracing::error!(
            path = %condition.path.display(),
            attempts = condition.max_attempts,
            "Readiness timeout"
        );
        Err(ReadinessTimeoutError {
            path: condition.path.clone(),
            attempts: condition.max_attempts,
            interval: condition.interval,
        })
    }
}
