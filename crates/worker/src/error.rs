// SPDX-License-Identifier: MIT

//! Worker-side errors.

use lectern_core::error::{Classify, ErrorClass};
use lectern_store::StoreError;
use thiserror::Error;

/// A converter rejected or failed on a job.
///
/// `Input` means the source artifact is bad (a user error recorded on the
/// job row); `Tool` means the external tool itself misbehaved.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("converter tool failed: {0}")]
    Tool(String),
    #[error("converter timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for ConvertError {
    fn class(&self) -> ErrorClass {
        match self {
            ConvertError::Input(_) => ErrorClass::User,
            _ => ErrorClass::Infrastructure,
        }
    }
}

/// Errors that abort the worker loop (converter failures do not; they fail
/// the job and the loop continues).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(&'static str, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for WorkerError {
    fn class(&self) -> ErrorClass {
        match self {
            WorkerError::Store(e) => e.class(),
            WorkerError::MissingEnv(_) | WorkerError::InvalidEnv(..) => {
                ErrorClass::Configuration
            }
            WorkerError::Io(_) => ErrorClass::Infrastructure,
        }
    }
}
