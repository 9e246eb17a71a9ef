// SPDX-License-Identifier: MIT

//! Build reporting with late-error suppression.
//!
//! Workers wind down asynchronously after a build; once the success
//! summary is out, their parting errors and warnings must not smear the
//! output. `build_finished` flips exactly once and everything reported
//! after it is dropped (trace-logged only).

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct BuildReporter {
    build_finished: AtomicBool,
    jobs_completed: AtomicUsize,
    jobs_failed: AtomicUsize,
    jobs_cancelled: AtomicUsize,
    cache_hits: AtomicUsize,
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl BuildReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the build finished; later error/warning reports are dropped.
    pub fn finish(&self) {
        self.build_finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.build_finished.load(Ordering::SeqCst)
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        if self.is_finished() {
            tracing::trace!(%message, "suppressing error after build finished");
            return;
        }
        tracing::error!("{message}");
        self.errors.lock().push(message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        let message = message.into();
        if self.is_finished() {
            tracing::trace!(%message, "suppressing warning after build finished");
            return;
        }
        tracing::warn!("{message}");
        self.warnings.lock().push(message);
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn counts(&self) -> (usize, usize, usize, usize) {
        (
            self.jobs_completed.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_cancelled.load(Ordering::Relaxed),
            self.cache_hits.load(Ordering::Relaxed),
        )
    }

    /// One-line summary for the end of a build.
    pub fn summary(&self) -> String {
        let (completed, failed, cancelled, cache_hits) = self.counts();
        format!(
            "{completed} completed, {failed} failed, {cancelled} cancelled, {cache_hits} cache hits"
        )
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
