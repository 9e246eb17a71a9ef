// SPDX-License-Identifier: MIT

//! Pool manager: parallel startup, health monitoring, stale cleanup,
//! graceful shutdown.
//!
//! Startup never waits for workers to phone home. Each start task
//! pre-registers a `created` row, hands the row id to the executor, and
//! returns; activation is the worker's own first act. Downstream code that
//! needs an active worker treats `created` rows as "about to be available"
//! and waits behind a bounded timeout.

use crate::error::PoolError;
use crate::executor::{StartSpec, WorkerExecutor};
use crate::subprocess::process_alive;
use lectern_core::{Clock, ExecutionMode, WorkerEventKind, WorkerStatus};
use lectern_store::{JobQueue, NewEvent, StaleConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One configured worker pool.
#[derive(Debug, Clone)]
pub struct PoolSpec {
    pub worker_type: String,
    pub count: usize,
    pub mode: ExecutionMode,
}

/// Pool-manager configuration; defaults match the suggested operational
/// timings (heartbeat 5 s, hung 30 s, dead +60 s, created 30 s).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pools: Vec<PoolSpec>,
    pub db_path: PathBuf,
    pub workspace_path: PathBuf,
    pub log_level: String,
    pub max_startup_concurrency: usize,
    pub heartbeat_grace: Duration,
    pub stale: StaleConfig,
    pub monitor_interval: Duration,
    pub stop_grace: Duration,
    /// Start a replacement when a monitored worker is found dead.
    pub restart_dead: bool,
}

impl PoolConfig {
    pub fn new(db_path: impl Into<PathBuf>, workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            pools: Vec::new(),
            db_path: db_path.into(),
            workspace_path: workspace_path.into(),
            log_level: "info".to_string(),
            max_startup_concurrency: 10,
            heartbeat_grace: Duration::from_secs(30),
            stale: StaleConfig::default(),
            monitor_interval: Duration::from_secs(10),
            stop_grace: Duration::from_secs(10),
            restart_dead: false,
        }
    }

    pub fn pool(mut self, worker_type: impl Into<String>, count: usize, mode: ExecutionMode) -> Self {
        self.pools.push(PoolSpec { worker_type: worker_type.into(), count, mode });
        self
    }
}

/// One successfully started worker.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub worker_id: i64,
    pub worker_type: String,
    pub executor_id: String,
    pub mode: ExecutionMode,
}

/// Outcome of a startup fan-out.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<WorkerInfo>,
    pub failed: Vec<(String, String)>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct PoolManager<C: Clock> {
    queue: JobQueue<C>,
    executors: HashMap<ExecutionMode, Arc<dyn WorkerExecutor>>,
    config: PoolConfig,
    session_id: String,
}

impl<C: Clock> PoolManager<C> {
    pub fn new(queue: JobQueue<C>, config: PoolConfig) -> Self {
        Self {
            queue,
            executors: HashMap::new(),
            config,
            session_id: lectern_core::session_id(),
        }
    }

    pub fn with_executor(mut self, mode: ExecutionMode, executor: Arc<dyn WorkerExecutor>) -> Self {
        self.executors.insert(mode, executor);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn queue(&self) -> &JobQueue<C> {
        &self.queue
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn executor_for(&self, mode: ExecutionMode) -> Result<Arc<dyn WorkerExecutor>, PoolError> {
        self.executors.get(&mode).cloned().ok_or(PoolError::NoExecutor(mode))
    }

    /// Start every configured pool, with at most `max_startup_concurrency`
    /// executor starts in flight. Individual failures are recorded, not
    /// propagated; callers inspect the report.
    pub async fn start_pools(&self) -> Result<StartReport, PoolError> {
        self.start_counts(
            self.config.pools.iter().map(|p| (p.clone(), p.count)).collect(),
        )
        .await
    }

    /// Start `count` workers per given spec (the lifecycle manager passes
    /// deficits here when reusing existing workers).
    pub async fn start_counts(
        &self,
        specs: Vec<(PoolSpec, usize)>,
    ) -> Result<StartReport, PoolError> {
        let total: usize = specs.iter().map(|(_, n)| n).sum();
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::PoolStarting)
                .session(self.session_id.clone())
                .message(format!("{total} workers")),
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_startup_concurrency.max(1)));
        let mut tasks: JoinSet<Result<WorkerInfo, (String, String)>> = JoinSet::new();
        for (spec, count) in specs {
            for index in 0..count {
                let semaphore = Arc::clone(&semaphore);
                let task = self.start_task(spec.clone(), index)?;
                tasks.spawn(async move {
                    // Closed only on runtime shutdown; treat as spawn failure.
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| (task.spec.worker_type.clone(), e.to_string()))?;
                    task.run().await
                });
            }
        }

        let mut report = StartReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(info)) => report.started.push(info),
                Ok(Err((worker_type, error))) => report.failed.push((worker_type, error)),
                Err(e) => return Err(PoolError::StartupTask(e.to_string())),
            }
        }

        self.queue.log_event(
            NewEvent::new(WorkerEventKind::PoolStarted)
                .session(self.session_id.clone())
                .message(format!(
                    "{} started, {} failed",
                    report.started.len(),
                    report.failed.len()
                )),
        );
        Ok(report)
    }

    fn start_task(&self, spec: PoolSpec, index: usize) -> Result<StartTask<C>, PoolError> {
        Ok(StartTask {
            queue: self.queue.clone(),
            executor: self.executor_for(spec.mode)?,
            session_id: self.session_id.clone(),
            db_path: self.config.db_path.clone(),
            workspace_path: self.config.workspace_path.clone(),
            log_level: self.config.log_level.clone(),
            spec,
            index,
        })
    }

    /// One health-monitoring pass.
    ///
    /// Ladder: silent idle/busy rows are marked hung by the store sweep;
    /// hung rows past the second grace are probed through the executor and
    /// marked dead if the process is gone; overdue `created` rows are
    /// deleted (orphan if the parent died, failed activation otherwise).
    pub async fn monitor_once(&self) -> Result<(), PoolError> {
        let report = self.queue.cleanup_stale(&self.config.stale)?;

        for record in &report.dead_candidates {
            let gone = match &record.executor_id {
                None => true,
                Some(executor_id) => {
                    let executor = self.executor_for(record.execution_mode)?;
                    !executor.is_alive(executor_id).await.unwrap_or(false)
                }
            };
            if gone {
                tracing::warn!(
                    worker_id = record.id,
                    worker_type = %record.worker_type,
                    "hung worker process is gone, marking dead"
                );
                self.queue.set_worker_status(record.id, WorkerStatus::Dead)?;
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::WorkerFailed)
                        .worker(record.id, record.worker_type.clone())
                        .session(self.session_id.clone())
                        .message("heartbeat lost and process gone"),
                );
                if self.config.restart_dead {
                    self.restart_worker(&record.worker_type).await;
                }
            }
        }

        // Busy workers burning no CPU with an aging heartbeat are stuck in
        // a converter; surface them early where stats exist.
        self.check_stuck_busy().await?;

        for record in &report.stale_created {
            let parent_gone = record.parent_pid.map(|pid| !process_alive(pid)).unwrap_or(true);
            self.queue.delete_worker(record.id)?;
            if parent_gone {
                tracing::info!(worker_id = record.id, "reaping created row of dead parent");
            } else {
                tracing::warn!(
                    worker_id = record.id,
                    worker_type = %record.worker_type,
                    "worker failed to activate within grace"
                );
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::WorkerFailed)
                        .worker(record.id, record.worker_type.clone())
                        .session(self.session_id.clone())
                        .message("did not activate within grace"),
                );
            }
        }

        Ok(())
    }

    async fn check_stuck_busy(&self) -> Result<(), PoolError> {
        let half_grace = self.config.stale.hung_after_ms / 2;
        let now = self.queue.clock().epoch_ms();
        for pool in &self.config.pools {
            for record in self.queue.workers_of_type(&pool.worker_type)? {
                if record.status != WorkerStatus::Busy {
                    continue;
                }
                let heartbeat_age =
                    record.last_heartbeat.map(|hb| now.saturating_sub(hb)).unwrap_or(u64::MAX);
                if heartbeat_age < half_grace {
                    continue;
                }
                let Some(executor_id) = &record.executor_id else { continue };
                let executor = self.executor_for(record.execution_mode)?;
                if let Ok(Some(stats)) = executor.stats(executor_id).await {
                    if stats.cpu_percent < 0.5 {
                        tracing::warn!(
                            worker_id = record.id,
                            cpu = stats.cpu_percent,
                            "busy worker idle at the CPU, marking hung"
                        );
                        self.queue.set_worker_status(record.id, WorkerStatus::Hung)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn restart_worker(&self, worker_type: &str) {
        let Some(spec) = self.config.pools.iter().find(|p| p.worker_type == worker_type) else {
            return;
        };
        match self.start_counts(vec![(spec.clone(), 1)]).await {
            Ok(report) if report.all_started() => {
                tracing::info!(worker_type, "restarted dead worker");
            }
            Ok(report) => {
                tracing::warn!(worker_type, failures = ?report.failed, "worker restart failed");
            }
            Err(e) => {
                tracing::warn!(worker_type, error = %e, "worker restart errored");
            }
        }
    }

    /// Periodic monitoring until cancelled.
    pub async fn run_monitor(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.monitor_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.monitor_once().await {
                        tracing::error!(error = %e, "pool monitor pass failed");
                    }
                }
            }
        }
    }

    /// Gracefully stop every worker of this session: soft stop through the
    /// executor, bounded wait, hard kill, row deletion.
    pub async fn stop_session(&self) -> Result<(), PoolError> {
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::PoolStopping).session(self.session_id.clone()),
        );
        for pool in &self.config.pools {
            for record in self.queue.workers_of_type(&pool.worker_type)? {
                if record.session_id.as_deref() != Some(self.session_id.as_str()) {
                    continue;
                }
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::WorkerStopping)
                        .worker(record.id, record.worker_type.clone())
                        .session(self.session_id.clone()),
                );
                if let Some(executor_id) = &record.executor_id {
                    let executor = self.executor_for(record.execution_mode)?;
                    if let Err(e) = executor.stop(executor_id, self.config.stop_grace).await {
                        tracing::warn!(
                            worker_id = record.id,
                            error = %e,
                            "executor stop failed, deleting row anyway"
                        );
                    }
                }
                self.queue.delete_worker(record.id)?;
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::WorkerStopped)
                        .worker(record.id, record.worker_type.clone())
                        .session(self.session_id.clone()),
                );
            }
        }
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::PoolStopped).session(self.session_id.clone()),
        );
        Ok(())
    }
}

/// One bounded startup task: pre-register, start, record.
struct StartTask<C: Clock> {
    queue: JobQueue<C>,
    executor: Arc<dyn WorkerExecutor>,
    session_id: String,
    db_path: PathBuf,
    workspace_path: PathBuf,
    log_level: String,
    spec: PoolSpec,
    index: usize,
}

impl<C: Clock> StartTask<C> {
    async fn run(self) -> Result<WorkerInfo, (String, String)> {
        let worker_type = self.spec.worker_type.clone();
        self.start().await.map_err(|e| {
            tracing::error!(
                worker_type = %worker_type,
                index = self.index,
                error = %e,
                "worker start failed"
            );
            (worker_type, e.to_string())
        })
    }

    async fn start(&self) -> Result<WorkerInfo, PoolError> {
        let worker_id = self.queue.pre_register(
            &self.spec.worker_type,
            self.spec.mode,
            None,
            std::process::id(),
            &self.session_id,
        )?;
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::WorkerStarting)
                .worker(worker_id, self.spec.worker_type.clone())
                .execution_mode(self.spec.mode)
                .session(self.session_id.clone()),
        );

        let spec = StartSpec {
            worker_type: self.spec.worker_type.clone(),
            index: self.index,
            worker_id,
            db_path: self.db_path.clone(),
            workspace_path: self.workspace_path.clone(),
            log_level: self.log_level.clone(),
            parent_pid: std::process::id(),
        };
        let executor_id = match self.executor.start(&spec).await {
            Ok(id) => id,
            Err(e) => {
                // The row will never activate; remove it and record why.
                self.queue.delete_worker(worker_id)?;
                self.queue.log_event(
                    NewEvent::new(WorkerEventKind::WorkerFailed)
                        .worker(worker_id, self.spec.worker_type.clone())
                        .session(self.session_id.clone())
                        .message(e.to_string()),
                );
                return Err(e.into());
            }
        };
        self.queue.set_executor_id(worker_id, &executor_id)?;
        self.queue.log_event(
            NewEvent::new(WorkerEventKind::WorkerRegistered)
                .worker(worker_id, self.spec.worker_type.clone())
                .execution_mode(self.spec.mode)
                .session(self.session_id.clone())
                .message(executor_id.clone()),
        );
        Ok(WorkerInfo {
            worker_id,
            worker_type: self.spec.worker_type.clone(),
            executor_id,
            mode: self.spec.mode,
        })
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
