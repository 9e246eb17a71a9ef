// SPDX-License-Identifier: MIT

//! Clock abstraction for testable time handling.
//!
//! Store rows keep epoch milliseconds as integers, so the trait exposes
//! `epoch_ms` alongside the monotonic `now` used for elapsed-time math.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock.
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClock;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::Clock;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Fake clock for testing with controllable time.
    #[derive(Clone)]
    pub struct FakeClock {
        inner: Arc<Mutex<State>>,
    }

    struct State {
        now: Instant,
        epoch_ms: u64,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(State {
                    now: Instant::now(),
                    epoch_ms: 1_700_000_000_000,
                })),
            }
        }

        /// Advance both the monotonic and epoch views by the given duration.
        pub fn advance(&self, duration: Duration) {
            let mut state = self.inner.lock();
            state.now += duration;
            state.epoch_ms += duration.as_millis() as u64;
        }

        /// Set the epoch milliseconds value.
        pub fn set_epoch_ms(&self, ms: u64) {
            self.inner.lock().epoch_ms = ms;
        }
    }

    impl Default for FakeClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.inner.lock().now
        }

        fn epoch_ms(&self) -> u64 {
            self.inner.lock().epoch_ms
        }
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
