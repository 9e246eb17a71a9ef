// SPDX-License-Identifier: MIT

//! Shared scenario harness.

use async_trait::async_trait;
use lectern_build::{Backend, BackendConfig, BuildReporter, Course, Orchestrator};
use lectern_core::{ExecutionMode, Job, SystemClock};
use lectern_store::{JobQueue, ResultStore, Store};
use lectern_worker::{CancelProbe, ConvertError, Converter, PollConfig, WorkerEnv, WorkerLoop};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub use lectern_core::Clock;

/// Converter standing in for the real notebook/diagram tools: tags the
/// source text with the requested format/kind so outputs are
/// distinguishable, and sleeps a moment per configured delay to give
/// cancellation something to race against.
#[derive(Clone)]
pub struct TaggingConverter {
    pub delay: Duration,
}

impl Default for TaggingConverter {
    fn default() -> Self {
        Self { delay: Duration::ZERO }
    }
}

#[async_trait]
impl Converter for TaggingConverter {
    async fn process_job<C: Clock>(
        &self,
        job: &Job,
        cancel: &mut CancelProbe<'_, C>,
    ) -> Result<Vec<u8>, ConvertError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
            if cancel.is_cancelled().unwrap_or(false) {
                return Err(ConvertError::Tool("cancelled mid-flight".to_string()));
            }
        }
        let text = std::fs::read_to_string(&job.input_file)?;
        let format = job
            .payload
            .extra
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or("raw");
        let kind = job.payload.extra.get("kind").and_then(|v| v.as_str()).unwrap_or("-");
        Ok(format!("{format}/{kind}|{text}").into_bytes())
    }
}

pub struct World {
    pub dir: TempDir,
    pub queue: JobQueue<SystemClock>,
    pub results: ResultStore<SystemClock>,
    pub reporter: Arc<BuildReporter>,
    worker_tokens: Vec<CancellationToken>,
}

impl World {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::open(dir.path().join("jobs.db")).expect("store");
        let queue = JobQueue::new(store, SystemClock);
        let results =
            ResultStore::open(dir.path().join("cache.db"), SystemClock).expect("cache store");
        World {
            dir,
            queue,
            results,
            reporter: Arc::new(BuildReporter::new()),
            worker_tokens: Vec::new(),
        }
    }

    /// Start an in-process worker loop of the given type.
    pub fn start_worker(&mut self, worker_type: &str, converter: TaggingConverter) -> i64 {
        let worker_id = self
            .queue
            .pre_register(worker_type, ExecutionMode::Direct, None, 1, "ses-spec")
            .expect("pre-register");
        let env = WorkerEnv {
            worker_id: Some(worker_id),
            worker_type: worker_type.to_string(),
            db_path: self.dir.path().join("jobs.db"),
            workspace_path: self.dir.path().to_path_buf(),
            log_level: "info".to_string(),
            parent_pid: None,
        };
        let worker = WorkerLoop::bind(
            self.queue.clone(),
            Some(self.results.clone()),
            converter,
            env,
            PollConfig {
                fast_interval: Duration::from_millis(5),
                idle_interval: Duration::from_millis(10),
                idle_after: Duration::from_millis(100),
                heartbeat_interval: Duration::from_millis(100),
                parent_check_every: 1000,
            },
        )
        .expect("bind worker");
        let token = CancellationToken::new();
        let run_token = token.clone();
        tokio::spawn(async move {
            worker.run(run_token).await.expect("worker loop");
        });
        self.worker_tokens.push(token);
        worker_id
    }

    pub fn stop_workers(&mut self) {
        for token in self.worker_tokens.drain(..) {
            token.cancel();
        }
    }

    pub fn backend(&self) -> Backend<SystemClock> {
        Backend::new(
            self.queue.clone(),
            self.results.clone(),
            Arc::clone(&self.reporter),
            BackendConfig {
                workers_ready_timeout: Duration::from_secs(5),
                workers_ready_poll: Duration::from_millis(20),
                heartbeat_grace: Duration::from_secs(30),
                wait_tick: Duration::from_millis(10),
            },
        )
    }

    pub fn orchestrator(&self) -> Orchestrator<Backend<SystemClock>> {
        let mut orchestrator = Orchestrator::new(self.backend());
        orchestrator.stage_timeout = Duration::from_secs(30);
        orchestrator
    }

    /// Write a one-file course and return (course, input path).
    pub fn course_with_file(&self, name: &str, content: &str) -> (Course, PathBuf) {
        let input = self.dir.path().join(format!("{name}.src"));
        std::fs::write(&input, content).expect("write input");
        let spec = format!(
            "[course]\nname = \"spec\"\nlanguages = [\"en\"]\n\n\
             [[section]]\nname = \"s\"\nfiles = [\"{name}.src\"]\n"
        );
        let spec_path = self.dir.path().join("course.toml");
        std::fs::write(&spec_path, spec).expect("write spec");
        (Course::load(&spec_path).expect("load course"), input)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.stop_workers();
    }
}
