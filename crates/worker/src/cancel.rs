// SPDX-License-Identifier: MIT

//! Store-backed cooperative cancellation token.
//!
//! Converters poll this during long operations. Reads are cached for a
//! short burst so a tight conversion loop does not hammer the store.

use lectern_core::Clock;
use lectern_store::{JobQueue, StoreError};
use std::time::{Duration, Instant};

const CACHE_TTL: Duration = Duration::from_millis(500);

/// Cancellation probe for one job.
pub struct CancelProbe<'a, C: Clock> {
    queue: &'a JobQueue<C>,
    job_id: i64,
    cached: Option<(Instant, bool)>,
    ttl: Duration,
}

impl<'a, C: Clock> CancelProbe<'a, C> {
    pub fn new(queue: &'a JobQueue<C>, job_id: i64) -> Self {
        Self { queue, job_id, cached: None, ttl: CACHE_TTL }
    }

    #[cfg(test)]
    fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Whether the job has been cancelled. Once true, stays true.
    pub fn is_cancelled(&mut self) -> Result<bool, StoreError> {
        let now = self.queue.clock().now();
        if let Some((at, value)) = self.cached {
            if value || now.duration_since(at) < self.ttl {
                return Ok(value);
            }
        }
        let value = self.queue.is_cancelled(self.job_id)?;
        self.cached = Some((now, value));
        Ok(value)
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
