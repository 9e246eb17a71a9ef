// SPDX-License-Identifier: MIT

//! The worker main loop.
//!
//! activate → claim → convert → write → cache → complete, forever.
//! Heartbeats are throttled, the parent pid is probed every few polls, and
//! a cancelled job is abandoned without being marked failed. The loop only
//! exits on shutdown, parent death, or a store-level failure.

use crate::cancel::CancelProbe;
use crate::convert::Converter;
use crate::env::WorkerEnv;
use crate::error::WorkerError;
use crate::output::write_atomic;
use lectern_core::{Clock, Job, JobType, WorkerEventKind, WorkerStatus};
use lectern_store::{with_busy_retry, Envelope, JobQueue, NewEvent, ResultStore};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll-loop tuning.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval while jobs are flowing.
    pub fast_interval: Duration,
    /// Interval once the queue has been idle for `idle_after`.
    pub idle_interval: Duration,
    /// How long without a claim before switching to the idle interval.
    pub idle_after: Duration,
    /// Minimum spacing between heartbeat writes.
    pub heartbeat_interval: Duration,
    /// Probe the parent pid every this many polls.
    pub parent_check_every: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(50),
            idle_interval: Duration::from_millis(500),
            idle_after: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            parent_check_every: 10,
        }
    }
}

/// One worker process's poll loop.
pub struct WorkerLoop<C: Clock, V: Converter> {
    queue: JobQueue<C>,
    results: Option<ResultStore<C>>,
    converter: V,
    env: WorkerEnv,
    worker_id: i64,
    job_type: JobType,
    config: PollConfig,
    clock: C,
}

impl<C: Clock, V: Converter> WorkerLoop<C, V> {
    /// Bind the loop to its pre-registered row (or self-register when the
    /// environment carries no id).
    pub fn bind(
        queue: JobQueue<C>,
        results: Option<ResultStore<C>>,
        converter: V,
        env: WorkerEnv,
        config: PollConfig,
    ) -> Result<Self, WorkerError> {
        let worker_id = match env.worker_id {
            Some(id) => id,
            None => {
                tracing::warn!(
                    worker_type = %env.worker_type,
                    "no pre-assigned worker id, self-registering"
                );
                queue.pre_register(
                    &env.worker_type,
                    lectern_core::ExecutionMode::Direct,
                    None,
                    env.parent_pid.unwrap_or(0),
                    "self-registered",
                )?
            }
        };
        let clock = queue.clock().clone();
        let job_type = JobType::parse(&env.worker_type);
        Ok(Self { queue, results, converter, env, worker_id, job_type, config, clock })
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// Run until `shutdown` fires, the parent dies, or the store becomes
    /// unusable. The row is marked dead on every exit path.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        self.queue.activate(self.worker_id)?;
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::WorkerReady)
                .worker(self.worker_id, self.env.worker_type.clone()),
        );
        tracing::info!(
            worker_id = self.worker_id,
            worker_type = %self.env.worker_type,
            "worker ready"
        );

        let outcome = self.poll_until_stopped(&shutdown).await;

        self.queue.set_worker_status(self.worker_id, WorkerStatus::Dead)?;
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::WorkerStopped)
                .worker(self.worker_id, self.env.worker_type.clone()),
        );
        outcome
    }

    async fn poll_until_stopped(&self, shutdown: &CancellationToken) -> Result<(), WorkerError> {
        let mut polls: u32 = 0;
        let parent_check_every = self.config.parent_check_every.max(1);
        let mut last_heartbeat = self.clock.now();
        let mut last_claim = self.clock.now();

        loop {
            if shutdown.is_cancelled() {
                tracing::info!(worker_id = self.worker_id, "shutdown requested, exiting");
                return Ok(());
            }

            polls = polls.wrapping_add(1);
            if polls % parent_check_every == 0 && self.parent_died() {
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::ParentDied)
                        .worker(self.worker_id, self.env.worker_type.clone()),
                );
                tracing::error!(worker_id = self.worker_id, "parent process died, exiting");
                return Ok(());
            }

            let now = self.clock.now();
            if now.duration_since(last_heartbeat) >= self.config.heartbeat_interval {
                self.queue.heartbeat(self.worker_id)?;
                last_heartbeat = now;
            }

            let claimed =
                with_busy_retry(|| self.queue.claim_next(&self.job_type, self.worker_id))?;
            match claimed {
                Some(job) => {
                    last_claim = self.clock.now();
                    self.handle_job(job).await?;
                    self.queue.set_worker_status(self.worker_id, WorkerStatus::Idle)?;
                }
                None => {
                    let interval = if self.clock.now().duration_since(last_claim)
                        < self.config.idle_after
                    {
                        self.config.fast_interval
                    } else {
                        self.config.idle_interval
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }
    }

    /// Convert one claimed job. Converter failures fail the job and return
    /// Ok — only store-level problems abort the loop.
    async fn handle_job(&self, job: Job) -> Result<(), WorkerError> {
        let mut cancel = CancelProbe::new(&self.queue, job.id);
        if cancel.is_cancelled()? {
            tracing::info!(job_id = job.id, "job cancelled before start, skipping");
            return Ok(());
        }

        tracing::info!(
            job_id = job.id,
            input = %job.input_file.display(),
            output = %job.output_file.display(),
            "processing job"
        );
        let bytes = match self.converter.process_job(&job, &mut cancel).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if self.queue.is_cancelled(job.id)? {
                    tracing::info!(job_id = job.id, "job cancelled during conversion");
                    return Ok(());
                }
                tracing::warn!(job_id = job.id, error = %e, "conversion failed");
                self.queue.fail(job.id, &e.to_string())?;
                return Ok(());
            }
        };

        // A cancellation that raced the conversion wins: discard the work.
        if self.queue.is_cancelled(job.id)? {
            tracing::info!(job_id = job.id, "job cancelled after conversion, discarding");
            return Ok(());
        }

        write_atomic(&job.output_file, &bytes)?;
        self.record_result(&job, &bytes);

        if !self.queue.complete(job.id)? {
            // Superseded between the cancellation check and completion.
            tracing::info!(job_id = job.id, "completion superseded by cancellation");
        }
        Ok(())
    }

    /// Populate both cache tiers. Best-effort: a cache write failure is
    /// not a job failure, the artifact is already on disk.
    fn record_result(&self, job: &Job, bytes: &[u8]) {
        let metadata = serde_json::json!({
            "kind": job.job_type.as_str(),
            "bytes": bytes.len(),
        });
        if let Err(e) =
            self.queue.put_cache(&job.output_file, &job.content_hash, &metadata.to_string())
        {
            tracing::warn!(job_id = job.id, error = %e, "result cache write failed");
        }
        if let Some(results) = &self.results {
            let envelope =
                Envelope::new(job.job_type.as_str(), metadata.clone(), bytes.to_vec());
            if let Err(e) = results.put(
                &job.input_file,
                &job.content_hash,
                &job.payload.fingerprint(),
                &envelope,
            ) {
                tracing::warn!(job_id = job.id, error = %e, "stored result write failed");
            }
        }
    }

    fn parent_died(&self) -> bool {
        match self.env.parent_pid {
            None | Some(0) => false,
            Some(pid) => !parent_alive(pid),
        }
    }
}

#[cfg(unix)]
fn parent_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn parent_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
#[path = "poll_tests.rs"]
mod tests;
