// SPDX-License-Identifier: MIT

//! Pool-layer errors.

use lectern_core::error::{Classify, ErrorClass};
use lectern_core::ExecutionMode;
use lectern_store::StoreError;
use thiserror::Error;

/// Errors from a worker executor backend.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),
    #[error("executor instance not found: {0}")]
    NotFound(String),
    #[error("command failed ({command}): {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for ExecutorError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Infrastructure
    }
}

/// Errors from pool and lifecycle management.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error("no executor configured for mode {0}")]
    NoExecutor(ExecutionMode),
    #[error("startup task panicked: {0}")]
    StartupTask(String),
}

impl Classify for PoolError {
    fn class(&self) -> ErrorClass {
        match self {
            PoolError::Store(e) => e.class(),
            PoolError::Executor(e) => e.class(),
            PoolError::NoExecutor(_) => ErrorClass::Configuration,
            PoolError::StartupTask(_) => ErrorClass::Infrastructure,
        }
    }
}
