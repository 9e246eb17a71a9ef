// SPDX-License-Identifier: MIT

//! Durable job queue with atomic claims.
//!
//! Many workers poll [`JobQueue::claim_next`] concurrently. The selection
//! and the update are bracketed in one immediate-mode write transaction:
//! only one worker wins a given row, the others see it `processing` on
//! retry. A select-then-update split would race and is not permitted here.

use crate::error::StoreError;
use crate::store::Store;
use lectern_core::{Clock, Job, JobPayload, JobStatus, JobType, NewJob};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const JOB_COLUMNS: &str = "id, job_type, status, priority, input_file, output_file, \
     content_hash, correlation_id, payload, attempts, max_attempts, error, \
     created_at, started_at, completed_at, cancelled_at, worker_id, cancelled_by";

/// Handle over the job table (plus registry, cache, and event log — see the
/// sibling modules, which add impl blocks to this type).
#[derive(Clone)]
pub struct JobQueue<C: Clock> {
    pub(crate) store: Store,
    pub(crate) clock: C,
}

/// Snapshot of job-row counts by status, for the status surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl<C: Clock> JobQueue<C> {
    pub fn new(store: Store, clock: C) -> Self {
        Self { store, clock }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The injected clock (shared with components that need consistent time).
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Insert a `pending` row.
    ///
    /// Fails with [`StoreError::DuplicateJob`] when an identical
    /// `(output_file, content_hash)` row is already pending or processing;
    /// the orchestrator treats that as "already submitted".
    pub fn add_job(&self, new: &NewJob) -> Result<i64, StoreError> {
        let mut conn = self.store.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let duplicate: Option<i64> = tx
            .query_row(
                "SELECT id FROM jobs
                 WHERE output_file = ?1 AND content_hash = ?2
                   AND status IN ('pending', 'processing')",
                params![path_str(&new.output_file), new.content_hash],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(StoreError::DuplicateJob {
                output_file: new.output_file.display().to_string(),
                content_hash: new.content_hash.clone(),
            });
        }
        tx.execute(
            "INSERT INTO jobs (job_type, status, priority, input_file, output_file,
                 content_hash, correlation_id, payload, attempts, max_attempts, created_at)
             VALUES (?1, 'pending', ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
            params![
                new.job_type.as_str(),
                new.priority,
                path_str(&new.input_file),
                path_str(&new.output_file),
                new.content_hash,
                new.correlation_id,
                serde_json::to_string(&new.payload)?,
                new.max_attempts,
                self.clock.epoch_ms(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Atomically claim the best pending job of `worker_type`.
    ///
    /// Selection order is `priority DESC, created_at ASC, id ASC`; rows with
    /// exhausted attempts never qualify. On success the row is `processing`
    /// with `started_at`, `worker_id`, and an incremented attempt counter,
    /// and the worker row is marked busy — all in the same transaction.
    pub fn claim_next(
        &self,
        worker_type: &JobType,
        worker_id: i64,
    ) -> Result<Option<Job>, StoreError> {
        let now = self.clock.epoch_ms();
        let mut conn = self.store.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = tx
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE job_type = ?1 AND status = 'pending' AND attempts < max_attempts
                     ORDER BY priority DESC, created_at ASC, id ASC
                     LIMIT 1"
                ),
                params![worker_type.as_str()],
                map_job_row,
            )
            .optional()?;
        let Some(mut job) = job else {
            tx.commit()?;
            return Ok(None);
        };
        tx.execute(
            "UPDATE jobs SET status = 'processing', started_at = ?1,
                 worker_id = ?2, attempts = attempts + 1
             WHERE id = ?3",
            params![now, worker_id, job.id],
        )?;
        tx.execute(
            "UPDATE workers SET status = 'busy' WHERE id = ?1 AND status = 'idle'",
            params![worker_id],
        )?;
        tx.commit()?;

        job.status = JobStatus::Processing;
        job.started_at = Some(now);
        job.worker_id = Some(worker_id);
        job.attempts += 1;
        Ok(Some(job))
    }

    /// Mark a processing job completed.
    ///
    /// Returns false when the row was superseded (cancelled) in the
    /// meantime; a cancelled row never becomes completed.
    pub fn complete(&self, job_id: i64) -> Result<bool, StoreError> {
        self.finish(job_id, JobStatus::Completed, None)
    }

    /// Mark a processing job failed, recording the error text.
    ///
    /// Rows are never requeued automatically; the caller may add a fresh
    /// job if it wants another attempt.
    pub fn fail(&self, job_id: i64, error_text: &str) -> Result<bool, StoreError> {
        self.finish(job_id, JobStatus::Failed, Some(error_text))
    }

    fn finish(
        &self,
        job_id: i64,
        status: JobStatus,
        error_text: Option<&str>,
    ) -> Result<bool, StoreError> {
        let now = self.clock.epoch_ms();
        let mut conn = self.store.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE jobs SET status = ?1, completed_at = ?2, error = ?3
             WHERE id = ?4 AND status = 'processing'",
            params![status.as_str(), now, error_text, job_id],
        )?;
        if changed == 0 {
            // Either unknown id or no longer processing (e.g. cancelled).
            let exists: Option<String> = tx
                .query_row("SELECT status FROM jobs WHERE id = ?1", params![job_id], |r| {
                    r.get(0)
                })
                .optional()?;
            tx.commit()?;
            return match exists {
                None => Err(StoreError::JobNotFound(job_id)),
                Some(_) => Ok(false),
            };
        }
        let counter = match status {
            JobStatus::Completed => "jobs_processed",
            _ => "jobs_failed",
        };
        tx.execute(
            &format!(
                "UPDATE workers SET {counter} = {counter} + 1
                 WHERE id = (SELECT worker_id FROM jobs WHERE id = ?1)"
            ),
            params![job_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Cancel every pending or processing job for `input_file`, recording
    /// the superseding correlation id. Processing workers observe the
    /// change cooperatively via [`JobQueue::is_cancelled`].
    pub fn cancel_for_input(
        &self,
        input_file: &Path,
        cancelled_by: &str,
    ) -> Result<Vec<i64>, StoreError> {
        let now = self.clock.epoch_ms();
        let mut conn = self.store.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM jobs
                 WHERE input_file = ?1 AND status IN ('pending', 'processing')
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![path_str(input_file)], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };
        if !ids.is_empty() {
            tx.execute(
                "UPDATE jobs SET status = 'cancelled', cancelled_by = ?1,
                     cancelled_at = ?2, completed_at = ?2
                 WHERE input_file = ?3 AND status IN ('pending', 'processing')",
                params![cancelled_by, now, path_str(input_file)],
            )?;
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Single-row cancellation probe, used by workers during long
    /// operations.
    pub fn is_cancelled(&self, job_id: i64) -> Result<bool, StoreError> {
        let conn = self.store.connect()?;
        let status: Option<String> = conn
            .query_row("SELECT status FROM jobs WHERE id = ?1", params![job_id], |row| {
                row.get(0)
            })
            .optional()?;
        match status {
            None => Err(StoreError::JobNotFound(job_id)),
            Some(s) => Ok(s == "cancelled"),
        }
    }

    /// Fetch one job row.
    pub fn get_job(&self, job_id: i64) -> Result<Job, StoreError> {
        let conn = self.store.connect()?;
        conn.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![job_id],
            map_job_row,
        )
        .optional()?
        .ok_or(StoreError::JobNotFound(job_id))
    }

    /// Fetch the status of many jobs at once (wait_for_completion polling).
    pub fn statuses(&self, job_ids: &[i64]) -> Result<HashMap<i64, JobStatus>, StoreError> {
        let conn = self.store.connect()?;
        let mut out = HashMap::with_capacity(job_ids.len());
        let mut stmt = conn.prepare("SELECT status FROM jobs WHERE id = ?1")?;
        for &id in job_ids {
            let status: Option<String> =
                stmt.query_row(params![id], |row| row.get(0)).optional()?;
            let Some(status) = status else {
                return Err(StoreError::JobNotFound(id));
            };
            out.insert(id, parse_status(&status)?);
        }
        Ok(out)
    }

    /// Job-row counts by status, for the status surface.
    pub fn job_counts(&self) -> Result<JobCounts, StoreError> {
        let conn = self.store.connect()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let mut counts = JobCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (status, n) = row?;
            match status.as_str() {
                "pending" => counts.pending = n,
                "processing" => counts.processing = n,
                "completed" => counts.completed = n,
                "failed" => counts.failed = n,
                "cancelled" => counts.cancelled = n,
                other => {
                    return Err(StoreError::Corrupt(format!("unknown job status '{other}'")))
                }
            }
        }
        Ok(counts)
    }

    /// Delete terminal rows older than `retention_ms`. Explicit maintenance
    /// only; nothing calls this automatically.
    pub fn prune_terminal(&self, retention_ms: u64) -> Result<usize, StoreError> {
        let cutoff = self.clock.epoch_ms().saturating_sub(retention_ms);
        let conn = self.store.connect()?;
        let n = conn.execute(
            "DELETE FROM jobs
             WHERE status IN ('completed', 'failed', 'cancelled') AND completed_at < ?1",
            params![cutoff],
        )?;
        Ok(n)
    }

    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        self.store.connect()
    }
}

pub(crate) fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    JobStatus::parse(s).ok_or_else(|| StoreError::Corrupt(format!("unknown job status '{s}'")))
}

/// Map a `SELECT {JOB_COLUMNS}` row into a [`Job`].
fn map_job_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let status_text: String = row.get(2)?;
    let payload_text: String = row.get(8)?;
    let status = JobStatus::parse(&status_text).ok_or_else(|| corrupt_column(2, &status_text))?;
    let payload: JobPayload = serde_json::from_str(&payload_text)
        .map_err(|e| corrupt_column(8, &e.to_string()))?;
    Ok(Job {
        id: row.get(0)?,
        job_type: JobType::parse(&row.get::<_, String>(1)?),
        status,
        priority: row.get(3)?,
        input_file: PathBuf::from(row.get::<_, String>(4)?),
        output_file: PathBuf::from(row.get::<_, String>(5)?),
        content_hash: row.get(6)?,
        correlation_id: row.get(7)?,
        payload,
        attempts: row.get(9)?,
        max_attempts: row.get(10)?,
        error: row.get(11)?,
        created_at: row.get(12)?,
        started_at: row.get(13)?,
        completed_at: row.get(14)?,
        cancelled_at: row.get(15)?,
        worker_id: row.get(16)?,
        cancelled_by: row.get(17)?,
    })
}

fn corrupt_column(index: usize, detail: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, detail.to_string())),
    )
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
