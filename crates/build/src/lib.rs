// SPDX-License-Identifier: MIT

//! Build orchestration.
//!
//! The orchestrator walks a course, generates stage-ordered operations per
//! output target, and drives them through the backend facade, which fronts
//! the job queue and the two cache tiers. A watch coordinator debounces
//! filesystem events into single-file rebuilds, and the shutdown
//! coordinator owns the driver's signal discipline.

mod backend;
mod course;
mod error;
mod orchestrator;
mod report;
mod resolver;
mod shutdown;
mod watch;

pub use backend::{Backend, BackendConfig, JobBackend};
pub use course::{
    classify, Course, CourseFile, FileKind, Format, Kind, Operation, OutputTarget,
};
pub use error::BuildError;
pub use orchestrator::{BuildOutcome, Orchestrator};
pub use report::BuildReporter;
pub use resolver::{ExecutionRequirement, ExecutionTable};
pub use shutdown::{ShutdownCoordinator, SignalAction, SignalState};
pub use watch::{Debouncer, WatchConfig, WatchCoordinator};
