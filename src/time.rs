//! Time provider abstraction.
//!
//! Provides a trait-based abstraction for time operations so that
//! `createdAt` timestamps, LWW "now" tie-breaks, and diff-rebase pending-age
//! cleanup can be tested deterministically, without thread sleeps.
//!
//! ```
//! use sync_engine::time::{TimeProvider, SystemTimeProvider};
//!
//! let provider = SystemTimeProvider;
//! let now = provider.now();
//! assert!(now <= chrono::Utc::now());
//! ```

use chrono::{DateTime, Utc};

/// Trait for providing the current time.
pub trait TimeProvider: Send + Sync {
    /// Get the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider using the actual system clock.
///
/// This is the default implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock time provider for deterministic tests.
///
/// ```
/// use sync_engine::time::{TimeProvider, MockTimeProvider};
/// use chrono::Duration;
///
/// let mut provider = MockTimeProvider::new();
/// let t1 = provider.now();
/// provider.advance(Duration::hours(1));
/// let t2 = provider.now();
/// assert_eq!(t2 - t1, Duration::hours(1));
/// ```
#[derive(Debug, Clone)]
pub struct MockTimeProvider {
    current_time: DateTime<Utc>,
}

impl MockTimeProvider {
    /// Create a new mock time provider starting at the current wall-clock time.
    pub fn new() -> Self {
        Self {
            current_time: Utc::now(),
        }
    }

    /// Create a mock time provider pinned to a specific starting time.
    pub fn with_time(time: DateTime<Utc>) -> Self {
        Self { current_time: time }
    }

    /// Set the current time to a specific value.
    pub fn set_time(&mut self, time: DateTime<Utc>) {
        self.current_time = time;
    }

    /// Advance time by the given duration. Negative durations move the
    /// clock backward, useful for exercising monotonic-ordering guarantees
    /// that must hold even under clock drift.
    pub fn advance(&mut self, duration: chrono::Duration) {
        self.current_time += duration;
    }
}

impl Default for MockTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MockTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        self.current_time
    }
}
