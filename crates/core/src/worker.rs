// SPDX-License-Identifier: MIT

//! Worker registry row model.

use serde::{Deserialize, Serialize};

/// Worker lifecycle status.
///
/// `Created` means the row was pre-registered by the pool manager but the
/// underlying process has not confirmed readiness; the parent owns the row
/// until activation. A stale heartbeat moves `Idle`/`Busy` rows to `Hung`,
/// then `Dead` after a further grace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Created,
    Idle,
    Busy,
    Hung,
    Dead,
}

impl WorkerStatus {
    /// Statuses that count toward pool capacity.
    pub fn is_healthy(&self) -> bool {
        matches!(self, WorkerStatus::Idle | WorkerStatus::Busy)
    }
}

crate::text_enum! {
    WorkerStatus {
        Created => "created",
        Idle => "idle",
        Busy => "busy",
        Hung => "hung",
        Dead => "dead",
    }
}

/// How the worker process is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Docker,
    Direct,
}

crate::text_enum! {
    ExecutionMode {
        Docker => "docker",
        Direct => "direct",
    }
}

/// A worker row as read back from the registry.
///
/// The row is a shared description of a live converter instance; ownership
/// of the underlying process/container stays with the executor that
/// spawned it.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: i64,
    pub worker_type: String,
    pub executor_id: Option<String>,
    pub status: WorkerStatus,
    pub execution_mode: ExecutionMode,
    pub parent_pid: Option<u32>,
    pub session_id: Option<String>,
    pub started_at: u64,
    pub last_heartbeat: Option<u64>,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
}

impl WorkerRecord {
    /// Healthy with a heartbeat no older than `grace_ms` relative to `now_ms`.
    pub fn is_fresh(&self, now_ms: u64, grace_ms: u64) -> bool {
        self.status.is_healthy()
            && self
                .last_heartbeat
                .is_some_and(|hb| now_ms.saturating_sub(hb) <= grace_ms)
    }
}

crate::row_builder! {
    pub struct WorkerRecordBuilder => WorkerRecord {
        fields {
            id: i64 = 1i64,
            worker_type: String = "notebook",
            status: WorkerStatus = WorkerStatus::Idle,
            execution_mode: ExecutionMode = ExecutionMode::Direct,
            started_at: u64 = 1_700_000_000_000u64,
            jobs_processed: u64 = 0u64,
            jobs_failed: u64 = 0u64,
        }
        optional {
            executor_id: String,
            parent_pid: u32,
            session_id: String,
            last_heartbeat: u64,
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
