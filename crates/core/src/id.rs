// SPDX-License-Identifier: MIT

//! Opaque id generation.
//!
//! Correlation and session ids are short prefixed nanoids (readable in
//! logs, stable length); subprocess executor ids carry a full UUID suffix
//! because they must stay unique across driver restarts.

/// Length of the random portion of prefixed ids.
const NANOID_LEN: usize = 12;

/// Tracing token shared by every job of one orchestrator-initiated batch.
pub fn correlation_id() -> String {
    format!("cor-{}", nanoid::nanoid!(NANOID_LEN))
}

/// Label grouping workers started together.
pub fn session_id() -> String {
    format!("ses-{}", nanoid::nanoid!(NANOID_LEN))
}

/// Executor id for a subprocess worker: `wrk-<type>-<uuid>`.
pub fn subprocess_executor_id(worker_type: &str) -> String {
    format!("wrk-{}-{}", worker_type, uuid::Uuid::new_v4())
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
