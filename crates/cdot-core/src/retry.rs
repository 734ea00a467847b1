//! Retry budget for rejected solutions

use std::thread;
use std::time::Duration;

/// How many times a problem may be attempted and how long to wait in between
///
/// The default never gives up, so a problem keeps being retried until a
/// valid solution comes back or generation itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Total attempts per problem, including the first; `None` is unbounded
    pub max_attempts: Option<u32>,
    /// Pause before each new attempt
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another attempt may start after `made` attempts
    #[inline]
    #[must_use]
    pub fn allows_another(&self, made: u32) -> bool {
        self.max_attempts.map_or(true, |max| made < max)
    }

    /// Sleep for the backoff, if any
    pub fn pause(&self) {
        if !self.backoff.is_zero() {
            thread::sleep(self.backoff);
        }
    }
}
