// SPDX-License-Identifier: MIT

//! Stage-ordered build driver.
//!
//! All operations of stage S complete before stage S+1 launches; within a
//! stage, submissions are fire-and-forget and completion order is
//! undefined. Failures follow policy: by default a failed stage is
//! reported and the build continues, `fail_fast` aborts instead.

use crate::backend::JobBackend;
use crate::course::{Course, CourseFile, Operation, OutputTarget};
use crate::error::BuildError;
use crate::resolver::ExecutionTable;
use lectern_core::error::{Classify, ErrorClass};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a build run amounted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    pub stages_run: u32,
    pub operations: usize,
    pub stages_failed: u32,
    pub aborted: bool,
}

impl BuildOutcome {
    pub fn success(&self) -> bool {
        self.stages_failed == 0 && !self.aborted
    }
}

pub struct Orchestrator<B: JobBackend> {
    backend: B,
    table: ExecutionTable,
    /// Abort the build on the first failed stage.
    pub fail_fast: bool,
    /// Ceiling on one stage's completion wait.
    pub stage_timeout: Duration,
}

impl<B: JobBackend> Orchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            table: ExecutionTable::default(),
            fail_fast: false,
            stage_timeout: Duration::from_secs(3600),
        }
    }

    pub fn with_table(mut self, table: ExecutionTable) -> Self {
        self.table = table;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run a full build of `course` into every target.
    pub async fn build(
        &self,
        course: &Course,
        targets: &[OutputTarget],
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildError> {
        let correlation = course.new_correlation();
        tracing::info!(
            course = %course.name,
            files = course.files.len(),
            targets = targets.len(),
            correlation = %correlation,
            "starting build"
        );
        let stages = self.generate(&course.files, &course.languages, targets, &correlation);
        self.run_stages(stages, cancel).await
    }

    /// Rebuild the operations of a single file (the watch path). Obsolete
    /// in-flight work for the file is superseded first.
    pub async fn rebuild_file(
        &self,
        course: &Course,
        path: &std::path::Path,
        targets: &[OutputTarget],
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildError> {
        let Some(file) = course.file_for_path(path) else {
            tracing::debug!(path = %path.display(), "changed file is not part of the course");
            return Ok(BuildOutcome::default());
        };
        let correlation = course.new_correlation();
        self.backend.cancel_for_input(path, &correlation)?;
        let stages = self.generate(
            std::slice::from_ref(file),
            &course.languages,
            targets,
            &correlation,
        );
        self.run_stages(stages, cancel).await
    }

    /// Flat operation sequence grouped into ordered stages.
    fn generate(
        &self,
        files: &[CourseFile],
        languages: &[String],
        targets: &[OutputTarget],
        correlation: &str,
    ) -> BTreeMap<u32, Vec<Operation>> {
        let mut stages: BTreeMap<u32, Vec<Operation>> = BTreeMap::new();
        for file in files {
            for target in targets {
                for operation in file.operations(target, languages, &self.table, correlation) {
                    stages.entry(operation.stage).or_default().push(operation);
                }
            }
        }
        stages
    }

    async fn run_stages(
        &self,
        stages: BTreeMap<u32, Vec<Operation>>,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome, BuildError> {
        let mut outcome = BuildOutcome::default();
        for (stage, operations) in stages {
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            tracing::info!(stage, operations = operations.len(), "launching stage");
            outcome.stages_run += 1;
            outcome.operations += operations.len();

            for operation in &operations {
                if cancel.is_cancelled() {
                    return Err(BuildError::Cancelled);
                }
                match self.backend.execute_operation(operation).await {
                    Ok(()) => {}
                    Err(e) if e.class() == ErrorClass::User => {
                        // Bad input artifact: count it, keep building.
                        tracing::warn!(
                            input = %operation.payload.input_file.display(),
                            error = %e,
                            "skipping operation"
                        );
                        outcome.stages_failed += 1;
                        if self.fail_fast {
                            outcome.aborted = true;
                            return Ok(outcome);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }

            let wait = tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                wait = self.backend.wait_for_completion(self.stage_timeout) => wait?,
            };
            if !wait {
                tracing::warn!(stage, "stage finished with unsuccessful jobs");
                outcome.stages_failed += 1;
                if self.fail_fast {
                    outcome.aborted = true;
                    return Ok(outcome);
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
