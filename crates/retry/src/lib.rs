//! Bounded exponential backoff.
//!
//! [`RetryGuard`] decides *how long* a caller keeps trying, the caller decides *what it means*
//! to give up: every [`RetryGuard::attempt`] call carries the error to hand back once the budget
//! is spent. A single guard is typically reused for structurally different failures inside one
//! retry loop.
//!
//! ```
//! use std::time::Duration;
//! use txq_retry::RetryGuard;
//!
//! let mut guard = RetryGuard::new(Duration::from_millis(1), Duration::from_millis(3));
//! assert!(guard.attempt("locked").is_ok()); // slept 1ms
//! assert!(guard.attempt("locked").is_ok()); // slept 2ms
//! assert_eq!(guard.attempt("locked"), Err("locked")); // 4ms more would exceed 3ms
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::{thread, time::Duration};
use tracing::{debug, trace};
use txq_config::RetryConfig;

/// Smallest delay a guard sleeps for. A zero base delay would never grow towards the ceiling.
pub const MIN_DELAY: Duration = Duration::from_micros(1);

/// Blocking retry controller with a doubling delay and a cumulative ceiling.
#[derive(Debug, Clone)]
pub struct RetryGuard {
    base_delay: Duration,
    ceiling: Duration,
    /// Delay the next attempt sleeps for.
    delay: Duration,
    /// Total time slept since the last reset.
    elapsed: Duration,
    attempts: usize,
}

impl RetryGuard {
    /// Creates a guard starting at `base_delay` that gives up once the cumulative delay would
    /// pass `ceiling`.
    ///
    /// A `base_delay` of zero is raised to [`MIN_DELAY`].
    pub const fn new(base_delay: Duration, ceiling: Duration) -> Self {
        let base_delay = if base_delay.is_zero() { MIN_DELAY } else { base_delay };
        Self { base_delay, ceiling, delay: base_delay, elapsed: Duration::ZERO, attempts: 0 }
    }

    /// Creates a guard from its configuration section.
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.ceiling)
    }

    /// Sleeps for the current delay and doubles it.
    ///
    /// If sleeping would push the cumulative delay past the ceiling, returns `err` without
    /// sleeping. The guard stays exhausted until [`RetryGuard::reset`] is called.
    pub fn attempt<E>(&mut self, err: E) -> Result<(), E> {
        let next = self.elapsed.saturating_add(self.delay);
        if next > self.ceiling {
            debug!(
                target: "retry",
                attempts = self.attempts,
                elapsed = ?self.elapsed,
                ceiling = ?self.ceiling,
                "giving up"
            );
            return Err(err)
        }

        trace!(target: "retry", attempt = self.attempts + 1, delay = ?self.delay, "backing off");
        thread::sleep(self.delay);

        self.elapsed = next;
        self.attempts += 1;
        self.delay = self.delay.saturating_mul(2);
        Ok(())
    }

    /// Restores the base delay and clears the cumulative budget.
    pub fn reset(&mut self) {
        self.delay = self.base_delay;
        self.elapsed = Duration::ZERO;
        self.attempts = 0;
    }

    /// Delay the next attempt would sleep for.
    pub const fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Cumulative delay slept since the last reset.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of successful attempts since the last reset.
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    /// Returns true if the next attempt would give up.
    pub fn is_exhausted(&self) -> bool {
        self.elapsed.saturating_add(self.delay) > self.ceiling
    }

    /// The configured ceiling.
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for RetryGuard {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
