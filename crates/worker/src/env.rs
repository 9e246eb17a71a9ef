// SPDX-License-Identifier: MIT

//! The environment handshake between the driver and a worker process.

use crate::error::WorkerError;
use std::path::PathBuf;

/// Parsed worker environment.
///
/// `WORKER_ID` is normally pre-assigned by the pool manager; `from_lookup`
/// accepts its absence so a standalone worker can fall back to
/// self-registration.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    pub worker_id: Option<i64>,
    pub worker_type: String,
    pub db_path: PathBuf,
    pub workspace_path: PathBuf,
    pub log_level: String,
    pub parent_pid: Option<u32>,
}

impl WorkerEnv {
    /// Read the contract from the process environment.
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the contract through a lookup function (testable without
    /// touching process globals).
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, WorkerError> {
        let worker_id = match lookup("WORKER_ID") {
            None => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|e| WorkerError::InvalidEnv("WORKER_ID", e.to_string()))?,
            ),
        };
        let worker_type = lookup("WORKER_TYPE").ok_or(WorkerError::MissingEnv("WORKER_TYPE"))?;
        let db_path =
            lookup("DB_PATH").map(PathBuf::from).ok_or(WorkerError::MissingEnv("DB_PATH"))?;
        let workspace_path = lookup("WORKSPACE_PATH")
            .map(PathBuf::from)
            .ok_or(WorkerError::MissingEnv("WORKSPACE_PATH"))?;
        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let parent_pid = match lookup("PARENT_PID") {
            None => None,
            Some(raw) => Some(
                raw.parse::<u32>()
                    .map_err(|e| WorkerError::InvalidEnv("PARENT_PID", e.to_string()))?,
            ),
        };
        Ok(Self { worker_id, worker_type, db_path, workspace_path, log_level, parent_pid })
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
