// SPDX-License-Identifier: MIT

//! Append-only worker lifecycle audit vocabulary.

use serde::{Deserialize, Serialize};

/// Event kinds written to the worker event log.
///
/// Pool-level events carry no worker id; `ParentDied` is logged by the
/// worker itself just before it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerEventKind {
    WorkerStarting,
    WorkerRegistered,
    WorkerReady,
    WorkerStopping,
    WorkerStopped,
    WorkerFailed,
    PoolStarting,
    PoolStarted,
    PoolStopping,
    PoolStopped,
    ParentDied,
}

crate::text_enum! {
    WorkerEventKind {
        WorkerStarting => "worker_starting",
        WorkerRegistered => "worker_registered",
        WorkerReady => "worker_ready",
        WorkerStopping => "worker_stopping",
        WorkerStopped => "worker_stopped",
        WorkerFailed => "worker_failed",
        PoolStarting => "pool_starting",
        PoolStarted => "pool_started",
        PoolStopping => "pool_stopping",
        PoolStopped => "pool_stopped",
        ParentDied => "parent_died",
    }
}
