// SPDX-License-Identifier: MIT

//! Store opening, pragmas, and forward-only migrations.
//!
//! The store file may live on a shared mount, so the journal mode is the
//! traditional rollback journal rather than WAL. Foreign keys are enforced
//! on every connection; a busy timeout tolerates concurrent writers.

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Forward-only migrations, index = schema version - 1. Never edit a shipped
/// entry; append a new one.
const MIGRATIONS: &[&str] = &[
    // v1: initial schema
    "
    CREATE TABLE IF NOT EXISTS workers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        worker_type TEXT NOT NULL,
        executor_id TEXT,
        status TEXT NOT NULL DEFAULT 'created',
        execution_mode TEXT NOT NULL DEFAULT 'direct',
        parent_pid INTEGER,
        session_id TEXT,
        started_at INTEGER NOT NULL,
        last_heartbeat INTEGER,
        jobs_processed INTEGER NOT NULL DEFAULT 0,
        jobs_failed INTEGER NOT NULL DEFAULT 0
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_workers_executor
        ON workers(executor_id) WHERE status != 'dead';
    CREATE INDEX IF NOT EXISTS idx_workers_type_status
        ON workers(worker_type, status);

    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        priority INTEGER NOT NULL DEFAULT 0,
        input_file TEXT NOT NULL,
        output_file TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        correlation_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        error TEXT,
        created_at INTEGER NOT NULL,
        started_at INTEGER,
        completed_at INTEGER,
        cancelled_at INTEGER,
        worker_id INTEGER REFERENCES workers(id),
        cancelled_by TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_jobs_claim
        ON jobs(job_type, status, priority DESC, created_at ASC, id ASC);
    CREATE INDEX IF NOT EXISTS idx_jobs_input
        ON jobs(input_file, status);

    CREATE TABLE IF NOT EXISTS result_cache (
        output_file TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        result_metadata TEXT,
        created_at INTEGER NOT NULL,
        last_accessed INTEGER NOT NULL,
        access_count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (output_file, content_hash)
    );

    CREATE TABLE IF NOT EXISTS worker_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        worker_id INTEGER,
        worker_type TEXT,
        execution_mode TEXT,
        message TEXT,
        metadata TEXT,
        session_id TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_session
        ON worker_events(session_id, id);
    ",
];

/// Handle to the store file; a factory for short-lived connections.
///
/// Cloning is cheap. The handle itself holds no connection, so it can be
/// shared freely across threads while each thread opens its own.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (creating if necessary) and migrate the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_migrations(path, MIGRATIONS)
    }

    /// Open with a caller-supplied migration list (the tier-1 cache store
    /// has its own schema but shares the connection discipline).
    pub(crate) fn open_with_migrations(
        path: impl AsRef<Path>,
        migrations: &[&str],
    ) -> Result<Self, StoreError> {
        let store = Self { path: path.as_ref().to_path_buf() };
        let mut conn = store.connect()?;
        migrate(&mut conn, migrations)?;
        Ok(store)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new short-lived connection with the store's pragmas applied.
    ///
    /// The caller closes it by dropping; connections must not be handed to
    /// another thread.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // journal_mode returns the resulting mode as a row
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = DELETE", [], |row| row.get(0))?;
        Ok(conn)
    }
}

/// Apply `migrations` forward from the recorded schema version.
pub(crate) fn migrate(conn: &mut Connection, migrations: &[&str]) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
    )?;
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let current: u32 = tx
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);
    let target = migrations.len() as u32;
    if current > target {
        return Err(StoreError::Corrupt(format!(
            "store schema version {} is newer than this build supports ({})",
            current, target
        )));
    }
    for (idx, sql) in migrations.iter().enumerate().skip(current as usize) {
        tracing::info!(version = idx + 1, "applying store migration");
        tx.execute_batch(sql)?;
    }
    if current == 0 {
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [target])?;
    } else if current < target {
        tx.execute("UPDATE schema_version SET version = ?1", [target])?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
