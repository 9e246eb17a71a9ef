// SPDX-License-Identifier: MIT

//! Converter contract and the command-template converter.
//!
//! The core never interprets artifacts: a converter takes a job and
//! returns the produced bytes, checking the cancellation probe during
//! long stretches. The one concrete implementation here shells out to an
//! external tool (nbconvert, plantuml, drawio CLIs and friends).

use crate::cancel::CancelProbe;
use crate::error::ConvertError;
use async_trait::async_trait;
use lectern_core::{Clock, Job};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Domain logic for one job type.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Produce the output bytes for `job`. Implementations should check
    /// `cancel` between expensive steps and bail out with any error; the
    /// poll loop discards the result of a cancelled job either way.
    async fn process_job<C: Clock>(
        &self,
        job: &Job,
        cancel: &mut CancelProbe<'_, C>,
    ) -> Result<Vec<u8>, ConvertError>;
}

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Converter that renders a command template and runs the external tool.
///
/// `{input}` and `{output}` placeholders are substituted per job; the tool
/// writes to a scratch output path whose bytes become the converter
/// result (the poll loop owns the final atomic write).
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, timeout: DEFAULT_TOOL_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn render_args(&self, input: &Path, scratch: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.display().to_string())
                    .replace("{output}", &scratch.display().to_string())
            })
            .collect()
    }

    fn scratch_path(job: &Job) -> std::path::PathBuf {
        let file_name = job
            .output_file
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        std::env::temp_dir().join(format!(".lectern-{}-{}", job.id, file_name))
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn process_job<C: Clock>(
        &self,
        job: &Job,
        cancel: &mut CancelProbe<'_, C>,
    ) -> Result<Vec<u8>, ConvertError> {
        if cancel.is_cancelled().unwrap_or(false) {
            return Err(ConvertError::Input("job cancelled before start".to_string()));
        }

        let scratch = Self::scratch_path(job);
        let args = self.render_args(&job.input_file, &scratch);
        tracing::debug!(job_id = job.id, program = %self.program, ?args, "running converter tool");

        let mut command = Command::new(&self.program);
        command.args(&args).kill_on_drop(true);
        let result = tokio::time::timeout(self.timeout, command.output()).await;
        let output = match result {
            Err(_) => {
                std::fs::remove_file(&scratch).ok();
                return Err(ConvertError::Timeout(self.timeout));
            }
            Ok(io) => io?,
        };
        if !output.status.success() {
            std::fs::remove_file(&scratch).ok();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Converter tools conventionally exit 1 on bad input, higher on
            // their own failures.
            return match output.status.code() {
                Some(1) => Err(ConvertError::Input(stderr)),
                _ => Err(ConvertError::Tool(stderr)),
            };
        }

        let bytes = if scratch.exists() {
            let bytes = std::fs::read(&scratch)?;
            std::fs::remove_file(&scratch).ok();
            bytes
        } else {
            // Filter-style tools write to stdout instead of a file.
            output.stdout
        };
        Ok(bytes)
    }
}

#[cfg(test)]
#[path = "convert_tests.rs"]
mod tests;
