// SPDX-License-Identifier: MIT

//! Worker executor contract.
//!
//! An executor owns the spawned process or container; the worker row in
//! the store is a shared description, not an ownership claim. Executors
//! never register workers — pre-registration happens in the pool manager
//! before `start` is called, and the pre-assigned id travels to the worker
//! through its environment.

use crate::error::ExecutorError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Everything an executor needs to start one worker instance.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub worker_type: String,
    /// Index within the pool, for log labels only.
    pub index: usize,
    /// Pre-assigned worker row id the process will activate.
    pub worker_id: i64,
    pub db_path: PathBuf,
    pub workspace_path: PathBuf,
    pub log_level: String,
    pub parent_pid: u32,
}

/// Point-in-time resource usage, where the backend can provide it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Lifecycle primitives over one kind of worker hosting.
#[async_trait]
pub trait WorkerExecutor: Send + Sync {
    /// Start a worker instance; returns a stable unique executor id.
    async fn start(&self, spec: &StartSpec) -> Result<String, ExecutorError>;

    /// Terminate softly, wait up to `grace`, then kill hard. Idempotent:
    /// an already-gone instance is not an error.
    async fn stop(&self, executor_id: &str, grace: Duration) -> Result<(), ExecutorError>;

    /// Whether the underlying process/container is still running.
    async fn is_alive(&self, executor_id: &str) -> Result<bool, ExecutorError>;

    /// Resource stats, or `None` when the backend cannot provide them.
    async fn stats(&self, executor_id: &str) -> Result<Option<ExecutorStats>, ExecutorError>;
}

/// The environment contract delivered to every worker process.
pub fn worker_env(spec: &StartSpec) -> Vec<(String, String)> {
    vec![
        ("WORKER_ID".to_string(), spec.worker_id.to_string()),
        ("WORKER_TYPE".to_string(), spec.worker_type.clone()),
        ("DB_PATH".to_string(), spec.db_path.display().to_string()),
        ("WORKSPACE_PATH".to_string(), spec.workspace_path.display().to_string()),
        ("LOG_LEVEL".to_string(), spec.log_level.clone()),
        ("PARENT_PID".to_string(), spec.parent_pid.to_string()),
    ]
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
