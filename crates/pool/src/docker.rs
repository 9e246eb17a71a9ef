// SPDX-License-Identifier: MIT

//! Container worker executor.
//!
//! Runs each worker in a managed container via the docker CLI, mounting
//! the workspace and store paths and injecting the worker env contract.
//! The container id returned by `docker run -d` is the executor id.

use crate::error::ExecutorError;
use crate::executor::{worker_env, ExecutorStats, StartSpec, WorkerExecutor};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Container-side mount points for the workspace and store directories.
const CONTAINER_WORKSPACE: &str = "/workspace";
const CONTAINER_STORE_DIR: &str = "/store";

pub struct DockerExecutor {
    image: String,
    /// Per-worker-type image overrides.
    images: std::collections::HashMap<String, String>,
}

impl DockerExecutor {
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into(), images: std::collections::HashMap::new() }
    }

    pub fn with_image_for(mut self, worker_type: impl Into<String>, image: impl Into<String>) -> Self {
        self.images.insert(worker_type.into(), image.into());
        self
    }

    fn image_for(&self, worker_type: &str) -> &str {
        self.images.get(worker_type).map(String::as_str).unwrap_or(&self.image)
    }

    fn container_name(spec: &StartSpec) -> String {
        format!("lectern-{}-{}", spec.worker_type, spec.worker_id)
    }
}

#[async_trait]
impl WorkerExecutor for DockerExecutor {
    async fn start(&self, spec: &StartSpec) -> Result<String, ExecutorError> {
        let name = Self::container_name(spec);
        let store_dir = spec.db_path.parent().unwrap_or_else(|| Path::new("."));
        let db_file = spec
            .db_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "jobs.db".to_string());

        let workspace_mount = format!(
            "{}:{}",
            escape_mount_path(&spec.workspace_path.display().to_string()),
            escape_mount_path(CONTAINER_WORKSPACE)
        );
        let store_mount = format!(
            "{}:{}",
            escape_mount_path(&store_dir.display().to_string()),
            escape_mount_path(CONTAINER_STORE_DIR)
        );

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            name,
            "-v".into(),
            workspace_mount,
            "-v".into(),
            store_mount,
        ];
        // Inside the container the paths differ from the host's.
        let mut env = worker_env(spec);
        for (key, value) in &mut env {
            match key.as_str() {
                "DB_PATH" => *value = format!("{CONTAINER_STORE_DIR}/{db_file}"),
                "WORKSPACE_PATH" => *value = CONTAINER_WORKSPACE.to_string(),
                _ => {}
            }
        }
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image_for(&spec.worker_type).to_string());

        let stdout = run_docker(&args).await?;
        let container_id = stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(ExecutorError::SpawnFailed(format!(
                "docker run for {} produced no container id",
                spec.worker_type
            )));
        }
        tracing::info!(
            container = %container_id,
            worker_type = %spec.worker_type,
            "started worker container"
        );
        Ok(container_id)
    }

    async fn stop(&self, executor_id: &str, grace: Duration) -> Result<(), ExecutorError> {
        let timeout = grace.as_secs().max(1).to_string();
        if let Err(e) =
            run_docker(&["stop".into(), "-t".into(), timeout, executor_id.into()]).await
        {
            if !is_no_such_container(&e) {
                return Err(e);
            }
        }
        // Remove the container so the name can be reused.
        if let Err(e) = run_docker(&["rm".into(), "-f".into(), executor_id.into()]).await {
            if !is_no_such_container(&e) {
                return Err(e);
            }
        }
        Ok(())
    }

    async fn is_alive(&self, executor_id: &str) -> Result<bool, ExecutorError> {
        match run_docker(&[
            "inspect".into(),
            "-f".into(),
            "{{.State.Running}}".into(),
            executor_id.into(),
        ])
        .await
        {
            Ok(out) => Ok(out.trim() == "true"),
            Err(e) if is_no_such_container(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn stats(&self, executor_id: &str) -> Result<Option<ExecutorStats>, ExecutorError> {
        let out = match run_docker(&[
            "stats".into(),
            "--no-stream".into(),
            "--format".into(),
            "{{.CPUPerc}} {{.MemUsage}}".into(),
            executor_id.into(),
        ])
        .await
        {
            Ok(out) => out,
            Err(e) if is_no_such_container(&e) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(parse_stats_line(out.trim()))
    }
}

/// Run a docker CLI command, capturing stdout; non-zero exit is an error
/// carrying stderr.
async fn run_docker(args: &[String]) -> Result<String, ExecutorError> {
    let output = Command::new("docker").args(args).output().await?;
    if !output.status.success() {
        return Err(ExecutorError::CommandFailed {
            command: format!("docker {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn is_no_such_container(err: &ExecutorError) -> bool {
    matches!(err, ExecutorError::CommandFailed { stderr, .. }
        if stderr.to_lowercase().contains("no such container"))
}

/// Some shell layers on Windows hosts rewrite arguments that begin with a
/// single `/` into host paths before docker sees them. Doubling the leading
/// separator suppresses the rewrite so the container sees the intended
/// path; elsewhere paths pass through untouched.
pub(crate) fn escape_mount_path(path: &str) -> String {
    if path_rewriting_shell() && path.starts_with('/') && !path.starts_with("//") {
        format!("/{path}")
    } else {
        path.to_string()
    }
}

fn path_rewriting_shell() -> bool {
    std::env::var_os("MSYSTEM").is_some()
}

/// Parse `docker stats` output like `12.34% 120MiB / 7.6GiB`.
fn parse_stats_line(line: &str) -> Option<ExecutorStats> {
    let mut parts = line.split_whitespace();
    let cpu = parts.next()?.trim_end_matches('%').parse::<f64>().ok()?;
    let memory_bytes = parse_mem(parts.next()?)?;
    Some(ExecutorStats { cpu_percent: cpu, memory_bytes })
}

fn parse_mem(raw: &str) -> Option<u64> {
    let units: &[(&str, f64)] = &[
        ("GiB", 1024.0 * 1024.0 * 1024.0),
        ("MiB", 1024.0 * 1024.0),
        ("KiB", 1024.0),
        ("GB", 1e9),
        ("MB", 1e6),
        ("kB", 1e3),
        ("B", 1.0),
    ];
    for (suffix, factor) in units {
        if let Some(number) = raw.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| (n * factor) as u64);
        }
    }
    None
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
