// SPDX-License-Identifier: MIT

//! Job row model and state machine.
//!
//! A job is one unit of work for exactly one converter kind. Rows are
//! durable: terminal jobs are retained for audit and monitoring rather
//! than deleted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Converter kind a job is dispatched to.
///
/// Each variant corresponds to one pool of worker processes. `Other` keeps
/// the queue open to converter kinds the core does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Notebook,
    Plantuml,
    Drawio,
    Other(String),
}

impl JobType {
    /// Store representation (TEXT column, also the pool name).
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Notebook => "notebook",
            JobType::Plantuml => "plantuml",
            JobType::Drawio => "drawio",
            JobType::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "notebook" => JobType::Notebook,
            "plantuml" => JobType::Plantuml,
            "drawio" => JobType::Drawio,
            other => JobType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
///
/// Transitions are monotone: `pending → processing → {completed, failed}`,
/// `pending → cancelled`, `processing → cancelled` (via worker cooperation).
/// A cancelled job never becomes completed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Check whether moving to `next` respects the monotone state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

crate::text_enum! {
    JobStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Serialized parameters handed to the converter.
///
/// Three fields are universal; everything else is opaque to the queue and
/// interpreted only by the converter for the job's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub correlation_id: String,
    /// Per-type fields (language, format, mode, template path, peer map).
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl JobPayload {
    pub fn new(
        input_file: impl Into<PathBuf>,
        output_file: impl Into<PathBuf>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            input_file: input_file.into(),
            output_file: output_file.into(),
            correlation_id: correlation_id.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Fingerprint of the per-type fields, used as the tier-1 cache key
    /// component for "semantically the same output".
    pub fn fingerprint(&self) -> String {
        let pairs: Vec<(String, String)> = self
            .extra
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
        crate::hash::metadata_fingerprint(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}

/// Parameters for enqueueing a job (everything the caller supplies;
/// the queue fills in id, timestamps, and counters).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub content_hash: String,
    pub correlation_id: String,
    pub payload: JobPayload,
    pub priority: i64,
    pub max_attempts: u32,
}

impl NewJob {
    /// Build from a payload, defaulting priority 0 and three attempts.
    pub fn from_payload(job_type: JobType, content_hash: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            job_type,
            input_file: payload.input_file.clone(),
            output_file: payload.output_file.clone(),
            content_hash: content_hash.into(),
            correlation_id: payload.correlation_id.clone(),
            payload,
            priority: 0,
            max_attempts: 3,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// A job row as read back from the store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i64,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub content_hash: String,
    pub correlation_id: String,
    pub payload: JobPayload,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
    pub worker_id: Option<i64>,
    pub cancelled_by: Option<String>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Attempts remaining before the row is exhausted.
    pub fn attempts_left(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

crate::row_builder! {
    pub struct JobBuilder => Job {
        fields {
            id: i64 = 1i64,
            job_type: JobType = JobType::Notebook,
            status: JobStatus = JobStatus::Pending,
            priority: i64 = 0i64,
            input_file: PathBuf = "/ws/topic.src",
            output_file: PathBuf = "/ws/out/topic.ipynb",
            content_hash: String = "deadbeef",
            correlation_id: String = "cor-test",
            payload: JobPayload = JobPayload::new("/ws/topic.src", "/ws/out/topic.ipynb", "cor-test"),
            attempts: u32 = 0u32,
            max_attempts: u32 = 3u32,
            created_at: u64 = 1_700_000_000_000u64,
        }
        optional {
            error: String,
            started_at: u64,
            completed_at: u64,
            cancelled_at: u64,
            worker_id: i64,
            cancelled_by: String,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
