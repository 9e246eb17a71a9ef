// SPDX-License-Identifier: MIT

//! Worker registry: pre-registration, activation, heartbeats, and stale
//! cleanup.
//!
//! The driver pre-registers a `created` row before spawning the process so
//! nothing has to wait for the worker to phone home; the worker activates
//! the row to `idle` once its runtime is up. Heartbeats are throttled by
//! the worker (≈5 s) to bound write contention.

use crate::error::StoreError;
use crate::queue::JobQueue;
use lectern_core::{Clock, ExecutionMode, WorkerRecord, WorkerStatus};
use rusqlite::{params, OptionalExtension, Row};

const WORKER_COLUMNS: &str = "id, worker_type, executor_id, status, execution_mode, \
     parent_pid, session_id, started_at, last_heartbeat, jobs_processed, jobs_failed";

/// Grace windows for [`JobQueue::cleanup_stale`].
#[derive(Debug, Clone, Copy)]
pub struct StaleConfig {
    /// Heartbeat silence after which idle/busy rows are marked hung.
    pub hung_after_ms: u64,
    /// Further silence after which hung rows are marked dead.
    pub dead_after_ms: u64,
    /// Age after which `created` rows are treated as failed activations.
    pub created_after_ms: u64,
}

impl Default for StaleConfig {
    fn default() -> Self {
        Self {
            hung_after_ms: 30_000,
            dead_after_ms: 60_000,
            created_after_ms: 30_000,
        }
    }
}

/// What a cleanup pass changed; the pool manager acts on the survivors.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Rows newly marked hung.
    pub hung: Vec<i64>,
    /// Hung rows old enough that the executor should be asked if the
    /// process is still alive (the pool manager marks them dead if not).
    pub dead_candidates: Vec<WorkerRecord>,
    /// `created` rows past their grace, for failed-activation handling.
    pub stale_created: Vec<WorkerRecord>,
}

impl<C: Clock> JobQueue<C> {
    /// Insert a `created` row owned by the parent until activation.
    pub fn pre_register(
        &self,
        worker_type: &str,
        execution_mode: ExecutionMode,
        executor_id: Option<&str>,
        parent_pid: u32,
        session_id: &str,
    ) -> Result<i64, StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO workers (worker_type, executor_id, status, execution_mode,
                 parent_pid, session_id, started_at)
             VALUES (?1, ?2, 'created', ?3, ?4, ?5, ?6)",
            params![
                worker_type,
                executor_id,
                execution_mode.as_str(),
                parent_pid,
                session_id,
                self.clock.epoch_ms(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record the executor id once the executor has started the process
    /// (subprocess ids are only known after spawn).
    pub fn set_executor_id(&self, worker_id: i64, executor_id: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE workers SET executor_id = ?1 WHERE id = ?2",
            params![executor_id, worker_id],
        )?;
        if n == 0 {
            return Err(StoreError::WorkerNotFound(worker_id));
        }
        Ok(())
    }

    /// Worker-side: transition the pre-registered `created` row to `idle`.
    pub fn activate(&self, worker_id: i64) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE workers SET status = 'idle', last_heartbeat = ?1
             WHERE id = ?2 AND status = 'created'",
            params![now, worker_id],
        )?;
        if n == 0 {
            return Err(StoreError::WorkerNotFound(worker_id));
        }
        Ok(())
    }

    /// Touch `last_heartbeat`.
    pub fn heartbeat(&self, worker_id: i64) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE workers SET last_heartbeat = ?1 WHERE id = ?2",
            params![self.clock.epoch_ms(), worker_id],
        )?;
        Ok(())
    }

    /// Set the worker status directly (idle↔busy oscillation, dead on exit).
    pub fn set_worker_status(
        &self,
        worker_id: i64,
        status: WorkerStatus,
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let n = conn.execute(
            "UPDATE workers SET status = ?1 WHERE id = ?2",
            params![status.as_str(), worker_id],
        )?;
        if n == 0 {
            return Err(StoreError::WorkerNotFound(worker_id));
        }
        Ok(())
    }

    /// Fetch one worker row.
    pub fn get_worker(&self, worker_id: i64) -> Result<WorkerRecord, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1"),
            params![worker_id],
            map_worker_row,
        )
        .optional()?
        .ok_or(StoreError::WorkerNotFound(worker_id))
    }

    /// All non-dead workers of a type.
    pub fn workers_of_type(&self, worker_type: &str) -> Result<Vec<WorkerRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers
             WHERE worker_type = ?1 AND status != 'dead'
             ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![worker_type], map_worker_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Count of healthy rows of a type with a heartbeat newer than
    /// `grace_ms` (the reuse policy's definition of "enough workers").
    pub fn healthy_worker_count(
        &self,
        worker_type: &str,
        grace_ms: u64,
    ) -> Result<usize, StoreError> {
        let now = self.clock.epoch_ms();
        let workers = self.workers_of_type(worker_type)?;
        Ok(workers.iter().filter(|w| w.is_fresh(now, grace_ms)).count())
    }

    /// Worker-row counts by status, for the status surface.
    pub fn worker_counts(&self) -> Result<Vec<(WorkerStatus, u64)>, StoreError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM workers GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (status, n) = row?;
            let status = WorkerStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown worker status '{status}'")))?;
            out.push((status, n));
        }
        Ok(out)
    }

    /// Remove a worker row (post-shutdown or orphan reaping). Idempotent.
    pub fn delete_worker(&self, worker_id: i64) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM workers WHERE id = ?1", params![worker_id])?;
        Ok(())
    }

    /// One stale-row sweep.
    ///
    /// Marks silent idle/busy rows hung, reports hung rows old enough for a
    /// liveness check, and reports overdue `created` rows. The pool manager
    /// decides what to do with the reported rows (it can ask the executor
    /// whether the process is really gone, which the store cannot).
    pub fn cleanup_stale(&self, config: &StaleConfig) -> Result<CleanupReport, StoreError> {
        let now = self.clock.epoch_ms();
        let mut report = CleanupReport::default();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let hung_cutoff = now.saturating_sub(config.hung_after_ms);
        {
            let mut stmt = tx.prepare(
                "SELECT id FROM workers
                 WHERE status IN ('idle', 'busy')
                   AND (last_heartbeat IS NULL OR last_heartbeat < ?1)",
            )?;
            let rows = stmt.query_map(params![hung_cutoff], |row| row.get::<_, i64>(0))?;
            report.hung = rows.collect::<Result<_, _>>()?;
        }
        for id in &report.hung {
            tx.execute("UPDATE workers SET status = 'hung' WHERE id = ?1", params![id])?;
            tracing::warn!(worker_id = id, "worker heartbeat stale, marking hung");
        }

        let dead_cutoff = now.saturating_sub(config.dead_after_ms);
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {WORKER_COLUMNS} FROM workers
                 WHERE status = 'hung'
                   AND (last_heartbeat IS NULL OR last_heartbeat < ?1)"
            ))?;
            let rows = stmt.query_map(params![dead_cutoff], map_worker_row)?;
            report.dead_candidates = rows.collect::<Result<_, _>>()?;
        }

        let created_cutoff = now.saturating_sub(config.created_after_ms);
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {WORKER_COLUMNS} FROM workers
                 WHERE status = 'created' AND started_at < ?1"
            ))?;
            let rows = stmt.query_map(params![created_cutoff], map_worker_row)?;
            report.stale_created = rows.collect::<Result<_, _>>()?;
        }

        tx.commit()?;
        Ok(report)
    }
}

/// Map a `SELECT {WORKER_COLUMNS}` row into a [`WorkerRecord`].
fn map_worker_row(row: &Row<'_>) -> rusqlite::Result<WorkerRecord> {
    let status_text: String = row.get(3)?;
    let mode_text: String = row.get(4)?;
    let status = WorkerStatus::parse(&status_text)
        .ok_or_else(|| corrupt_text(3, &status_text))?;
    let execution_mode =
        ExecutionMode::parse(&mode_text).ok_or_else(|| corrupt_text(4, &mode_text))?;
    Ok(WorkerRecord {
        id: row.get(0)?,
        worker_type: row.get(1)?,
        executor_id: row.get(2)?,
        status,
        execution_mode,
        parent_pid: row.get(5)?,
        session_id: row.get(6)?,
        started_at: row.get(7)?,
        last_heartbeat: row.get(8)?,
        jobs_processed: row.get(9)?,
        jobs_failed: row.get(10)?,
    })
}

fn corrupt_text(index: usize, detail: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, detail.to_string())),
    )
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
