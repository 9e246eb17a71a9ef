// SPDX-License-Identifier: MIT

//! Build-layer errors.

use lectern_core::error::{Classify, ErrorClass};
use lectern_core::JobType;
use lectern_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no workers available for job type {0}")]
    NoWorkersForType(JobType),
    #[error("cannot read input {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write output {path}: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid course spec {path}: {reason}")]
    InvalidCourseSpec { path: PathBuf, reason: String },
    #[error("watcher error: {0}")]
    Watch(String),
    #[error("watcher stopped after {0} consecutive handler errors")]
    WatchBroken(u32),
    #[error("build cancelled")]
    Cancelled,
}

impl Classify for BuildError {
    fn class(&self) -> ErrorClass {
        match self {
            BuildError::Store(e) => e.class(),
            BuildError::NoWorkersForType(_) => ErrorClass::Infrastructure,
            BuildError::InputUnreadable { .. } => ErrorClass::User,
            BuildError::OutputUnwritable { .. } => ErrorClass::Infrastructure,
            BuildError::InvalidCourseSpec { .. } => ErrorClass::Configuration,
            BuildError::Watch(_) | BuildError::WatchBroken(_) => ErrorClass::Infrastructure,
            BuildError::Cancelled => ErrorClass::Cancelled,
        }
    }
}
