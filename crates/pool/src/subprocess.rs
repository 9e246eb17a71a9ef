// SPDX-License-Identifier: MIT

//! Subprocess worker executor.
//!
//! Launches the worker module directly, in its own process group so that
//! converter children die with the worker. Termination sends SIGTERM to
//! the group, waits up to the grace, then SIGKILLs. On platforms without
//! process groups the signals fall back to the single child process.

use crate::error::ExecutorError;
use crate::executor::{worker_env, ExecutorStats, StartSpec, WorkerExecutor};
use async_trait::async_trait;
use lectern_core::subprocess_executor_id;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};

/// How the worker process is launched: a program plus fixed arguments; the
/// worker reads everything else from its environment.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Launch the current executable with the given subcommand arguments.
    pub fn current_exe(args: Vec<String>) -> Result<Self, ExecutorError> {
        let exe = std::env::current_exe()?;
        Ok(Self { program: exe.display().to_string(), args })
    }
}

pub struct SubprocessExecutor {
    command: WorkerCommand,
    children: Arc<Mutex<HashMap<String, Child>>>,
}

impl SubprocessExecutor {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command, children: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn child_pid(&self, executor_id: &str) -> Option<u32> {
        self.children.lock().get(executor_id).and_then(Child::id)
    }
}

#[async_trait]
impl WorkerExecutor for SubprocessExecutor {
    async fn start(&self, spec: &StartSpec) -> Result<String, ExecutorError> {
        let executor_id = subprocess_executor_id(&spec.worker_type);
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args);
        for (key, value) in worker_env(spec) {
            cmd.env(key, value);
        }
        cmd.stdin(std::process::Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            ExecutorError::SpawnFailed(format!(
                "{} (worker {} #{}): {}",
                self.command.program, spec.worker_type, spec.index, e
            ))
        })?;
        tracing::info!(
            executor_id = %executor_id,
            worker_type = %spec.worker_type,
            pid = child.id(),
            "spawned worker subprocess"
        );
        self.children.lock().insert(executor_id.clone(), child);
        Ok(executor_id)
    }

    async fn stop(&self, executor_id: &str, grace: Duration) -> Result<(), ExecutorError> {
        let Some(pid) = self.child_pid(executor_id) else {
            // Already reaped or never ours; nothing to do.
            return Ok(());
        };

        signal_group(pid, SoftOrHard::Soft);

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let exited = {
                let mut children = self.children.lock();
                match children.get_mut(executor_id) {
                    None => true,
                    Some(child) => child.try_wait().map(|s| s.is_some()).unwrap_or(true),
                }
            };
            if exited {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(executor_id, pid, "worker ignored soft stop, killing");
                signal_group(pid, SoftOrHard::Hard);
                if let Some(child) = self.children.lock().get_mut(executor_id) {
                    child.start_kill().ok();
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // Reap and forget.
        if let Some(mut child) = self.children.lock().remove(executor_id) {
            tokio::spawn(async move {
                child.wait().await.ok();
            });
        }
        Ok(())
    }

    async fn is_alive(&self, executor_id: &str) -> Result<bool, ExecutorError> {
        let mut children = self.children.lock();
        match children.get_mut(executor_id) {
            None => Ok(false),
            Some(child) => Ok(child.try_wait().map(|s| s.is_none()).unwrap_or(false)),
        }
    }

    async fn stats(&self, _executor_id: &str) -> Result<Option<ExecutorStats>, ExecutorError> {
        // No portable per-process stats without extra machinery.
        Ok(None)
    }
}

enum SoftOrHard {
    Soft,
    Hard,
}

#[cfg(unix)]
fn signal_group(pid: u32, kind: SoftOrHard) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    let signal = match kind {
        SoftOrHard::Soft => Signal::SIGTERM,
        SoftOrHard::Hard => Signal::SIGKILL,
    };
    // The child was started with process_group(0), so its pgid is its pid.
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        if e != nix::errno::Errno::ESRCH {
            tracing::debug!(pid, error = %e, "process group signal failed");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _kind: SoftOrHard) {
    // No process groups; stop() falls back to Child::start_kill.
}

/// Whether the process with `pid` is still alive (null-signal probe).
/// EPERM counts as alive: the process exists but is not ours.
#[cfg(unix)]
pub(crate) fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub(crate) fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
