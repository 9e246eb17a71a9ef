// SPDX-License-Identifier: MIT

//! Backend facade: cache check, job submission, completion wait.
//!
//! `execute_operation` is fire-and-forget — it either satisfies an
//! operation from a cache tier or enqueues a job and returns. The only
//! wait it performs is the bounded workers-ready check before enqueueing.
//! `wait_for_completion` polls the current cohort (everything submitted
//! since the last settled wait), back-fills the tier-1 store from the
//! bytes workers produced, and drains the cohort once it settles — each
//! stage or watch rebuild is judged on its own jobs only.

use crate::course::Operation;
use crate::error::BuildError;
use crate::report::BuildReporter;
use async_trait::async_trait;
use lectern_core::{content_hash, Clock, JobStatus, JobType, NewJob};
use lectern_store::{JobQueue, ResultStore, StoreError};
use lectern_worker::write_atomic;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Backend tuning; defaults follow the suggested operational bounds.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Ceiling on the wait for a `created` worker to activate.
    pub workers_ready_timeout: Duration,
    /// Poll spacing inside the workers-ready wait.
    pub workers_ready_poll: Duration,
    /// Heartbeat freshness window when counting ready workers.
    pub heartbeat_grace: Duration,
    /// Tick of the completion poll.
    pub wait_tick: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            workers_ready_timeout: Duration::from_secs(30),
            workers_ready_poll: Duration::from_millis(500),
            heartbeat_grace: Duration::from_secs(30),
            wait_tick: Duration::from_millis(100),
        }
    }
}

/// The orchestrator-facing contract (mockable in tests).
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Satisfy the operation from cache or enqueue a job. Returns without
    /// waiting for completion.
    async fn execute_operation(&self, operation: &Operation) -> Result<(), BuildError>;

    /// Block until every submitted job is terminal (or `timeout` passes).
    /// True iff all of them completed.
    async fn wait_for_completion(&self, timeout: Duration) -> Result<bool, BuildError>;

    /// Supersede in-flight work for an input file.
    fn cancel_for_input(&self, input: &Path, cancelled_by: &str) -> Result<Vec<i64>, BuildError>;
}

pub struct Backend<C: Clock> {
    queue: JobQueue<C>,
    results: ResultStore<C>,
    reporter: Arc<BuildReporter>,
    config: BackendConfig,
    /// The current cohort: jobs submitted since the last fully-settled
    /// wait. Drained when a wait settles, so one stage's (or one watch
    /// rebuild's) verdict never leaks into the next.
    submitted: Mutex<Vec<i64>>,
    /// Jobs whose terminal outcome has been counted and back-filled, so
    /// repeated waits neither double-count nor re-report.
    settled: Mutex<std::collections::HashSet<i64>>,
    /// Verdict of the last settled cohort, re-served by waits that arrive
    /// after it drained.
    last_outcome: Mutex<bool>,
}

impl<C: Clock> Backend<C> {
    pub fn new(
        queue: JobQueue<C>,
        results: ResultStore<C>,
        reporter: Arc<BuildReporter>,
        config: BackendConfig,
    ) -> Self {
        Self {
            queue,
            results,
            reporter,
            config,
            submitted: Mutex::new(Vec::new()),
            settled: Mutex::new(std::collections::HashSet::new()),
            last_outcome: Mutex::new(true),
        }
    }

    pub fn queue(&self) -> &JobQueue<C> {
        &self.queue
    }

    pub fn results(&self) -> &ResultStore<C> {
        &self.results
    }

    pub fn reporter(&self) -> &Arc<BuildReporter> {
        &self.reporter
    }

    /// Ids of the current cohort (submitted since the last settled wait).
    pub fn submitted(&self) -> Vec<i64> {
        self.submitted.lock().clone()
    }

    /// Bounded wait for a worker of `job_type`.
    ///
    /// An idle/busy row with a fresh heartbeat satisfies immediately; bare
    /// `created` rows mean "about to be available" and are polled until
    /// one activates. No rows at all is fatal.
    async fn workers_ready(&self, job_type: &JobType) -> Result<(), BuildError> {
        let deadline = tokio::time::Instant::now() + self.config.workers_ready_timeout;
        let grace_ms = self.config.heartbeat_grace.as_millis() as u64;
        loop {
            let workers = self.queue.workers_of_type(job_type.as_str())?;
            let now_ms = self.queue.clock().epoch_ms();
            if workers.iter().any(|w| w.is_fresh(now_ms, grace_ms)) {
                return Ok(());
            }
            let any_pending = workers
                .iter()
                .any(|w| w.status == lectern_core::WorkerStatus::Created);
            if !any_pending {
                return Err(BuildError::NoWorkersForType(job_type.clone()));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BuildError::NoWorkersForType(job_type.clone()));
            }
            tokio::time::sleep(self.config.workers_ready_poll).await;
        }
    }

    fn hash_operation(&self, operation: &Operation) -> Result<String, BuildError> {
        let input = &operation.payload.input_file;
        let bytes = std::fs::read(input).map_err(|e| BuildError::InputUnreadable {
            path: input.clone(),
            source: e,
        })?;
        Ok(content_hash(&bytes, &operation.payload.fingerprint()))
    }

    /// Back-fill tier-1 from the bytes a worker wrote to disk.
    fn store_result_from_output(&self, job_id: i64) -> Result<(), BuildError> {
        let job = self.queue.get_job(job_id)?;
        if !job.output_file.exists() {
            return Ok(());
        }
        let bytes =
            std::fs::read(&job.output_file).map_err(|e| BuildError::OutputUnwritable {
                path: job.output_file.clone(),
                source: e,
            })?;
        let metadata = serde_json::json!({
            "kind": job.job_type.as_str(),
            "bytes": bytes.len(),
        });
        let envelope = lectern_store::Envelope::new(job.job_type.as_str(), metadata, bytes);
        self.results.put(
            &job.input_file,
            &job.content_hash,
            &job.payload.fingerprint(),
            &envelope,
        )?;
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> JobBackend for Backend<C> {
    async fn execute_operation(&self, operation: &Operation) -> Result<(), BuildError> {
        let payload = &operation.payload;
        let hash = self.hash_operation(operation)?;

        // Tier 1: full bytes stored from an earlier run; materialize
        // without any worker involvement.
        if let Some(envelope) =
            self.results.get(&payload.input_file, &hash, &payload.fingerprint())?
        {
            if !operation.implicit {
                write_atomic(&payload.output_file, &envelope.payload).map_err(|e| {
                    BuildError::OutputUnwritable { path: payload.output_file.clone(), source: e }
                })?;
            }
            // Keep the tier-2 row in step (and its access counters moving).
            if self.queue.check_cache(&payload.output_file, &hash)?.is_none() {
                self.queue.put_cache(
                    &payload.output_file,
                    &hash,
                    &envelope.metadata.to_string(),
                )?;
            }
            self.reporter.cache_hit();
            tracing::debug!(output = %payload.output_file.display(), "tier-1 cache hit");
            return Ok(());
        }

        // Tier 2: the bytes on disk are already current.
        if self.queue.check_cache(&payload.output_file, &hash)?.is_some()
            && (operation.implicit || payload.output_file.exists())
        {
            self.reporter.cache_hit();
            tracing::debug!(output = %payload.output_file.display(), "tier-2 cache hit");
            return Ok(());
        }

        self.workers_ready(&operation.job_type).await?;

        let new = NewJob::from_payload(operation.job_type.clone(), hash, payload.clone());
        match self.queue.add_job(&new) {
            Ok(id) => {
                self.submitted.lock().push(id);
                Ok(())
            }
            Err(StoreError::DuplicateJob { output_file, .. }) => {
                // Another target resolved to the same artifact; the row
                // already pending/processing covers this operation.
                tracing::debug!(output = %output_file, "operation already submitted");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn wait_for_completion(&self, timeout: Duration) -> Result<bool, BuildError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let ids = self.submitted();
        if ids.is_empty() {
            // Nothing new since the last settled wait: repeat its verdict.
            return Ok(*self.last_outcome.lock());
        }
        loop {
            let statuses = self.queue.statuses(&ids)?;
            // Settle each newly-terminal job exactly once: back-fill
            // tier-1 for successes, count and report the rest.
            for (&id, &status) in &statuses {
                if !status.is_terminal() || self.settled.lock().contains(&id) {
                    continue;
                }
                self.settled.lock().insert(id);
                match status {
                    JobStatus::Completed => {
                        self.reporter.job_completed();
                        if let Err(e) = self.store_result_from_output(id) {
                            tracing::warn!(job_id = id, error = %e, "tier-1 back-fill failed");
                        }
                    }
                    JobStatus::Failed => {
                        self.reporter.job_failed();
                        let job = self.queue.get_job(id)?;
                        self.reporter.error(format!(
                            "job {} failed for {}: {}",
                            id,
                            job.input_file.display(),
                            job.error.as_deref().unwrap_or("unknown error")
                        ));
                    }
                    JobStatus::Cancelled => self.reporter.job_cancelled(),
                    JobStatus::Pending | JobStatus::Processing => {}
                }
            }
            if statuses.values().all(|s| s.is_terminal()) {
                let success = statuses.values().all(|&s| s == JobStatus::Completed);
                // The cohort is settled: drop its ids so the next stage
                // (or the next watch rebuild) is judged on its own jobs,
                // and remember the verdict for repeated waits.
                let drained: std::collections::HashSet<i64> = ids.iter().copied().collect();
                self.submitted.lock().retain(|id| !drained.contains(id));
                self.settled.lock().retain(|id| !drained.contains(id));
                *self.last_outcome.lock() = success;
                return Ok(success);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("wait_for_completion timed out with jobs still running");
                return Ok(false);
            }
            tokio::time::sleep(self.config.wait_tick).await;
        }
    }

    fn cancel_for_input(&self, input: &Path, cancelled_by: &str) -> Result<Vec<i64>, BuildError> {
        let cancelled = self.queue.cancel_for_input(input, cancelled_by)?;
        if !cancelled.is_empty() {
            tracing::info!(
                input = %input.display(),
                count = cancelled.len(),
                cancelled_by,
                "superseded in-flight jobs"
            );
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
