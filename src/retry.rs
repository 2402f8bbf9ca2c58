//! Polling policy for transient device conditions.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::traits::{CameraError, Outcome, Result};

/// Default delay between polls of a busy device.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to keep retrying an operation that reports [`Outcome::WouldBlock`].
///
/// The default policy never gives up. Callers that need a deadline set
/// [`RetryPolicy::with_max_attempts`] or [`RetryPolicy::with_max_elapsed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: Option<u32>,
    max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_POLL_INTERVAL)
    }
}

impl RetryPolicy {
    /// Retry forever, sleeping `interval` between attempts.
    #[must_use]
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            max_elapsed: None,
        }
    }

    /// Give up after `attempts` attempts (including the first).
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Give up once `elapsed` has passed since the first attempt.
    #[must_use]
    pub const fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = Some(elapsed);
        self
    }

    /// Delay between attempts.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempt limit, if any.
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Run `op` until it is ready, sleeping the policy interval between attempts.
    pub fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Result<Outcome<T>>,
    {
        self.run_with(op, thread::sleep)
    }

    /// Like [`RetryPolicy::run`] with a caller-supplied sleep function.
    ///
    /// Errors from `op` are returned immediately; only `WouldBlock` is retried.
    pub fn run_with<T, F, S>(&self, mut op: F, mut sleep: S) -> Result<T>
    where
        F: FnMut() -> Result<Outcome<T>>,
        S: FnMut(Duration),
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);
            if let Outcome::Ready(value) = op()? {
                return Ok(value);
            }

            let elapsed = started.elapsed();
            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            let out_of_time = self.max_elapsed.is_some_and(|max| elapsed >= max);
            if out_of_attempts || out_of_time {
                return Err(CameraError::RetryExhausted { attempts, elapsed });
            }

            trace!(attempts, interval = ?self.interval, "device busy, retrying");
            sleep(self.interval);
        }
    }
}
