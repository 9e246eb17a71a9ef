// SPDX-License-Identifier: MIT

//! Append-only worker lifecycle event log.
//!
//! Logging must never take down the operation being logged: failures to
//! append are traced and swallowed.

use crate::error::StoreError;
use crate::queue::JobQueue;
use lectern_core::{Clock, ExecutionMode, WorkerEventKind};
use rusqlite::params;

/// One event to append.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: WorkerEventKind,
    pub worker_id: Option<i64>,
    pub worker_type: Option<String>,
    pub execution_mode: Option<ExecutionMode>,
    pub message: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub session_id: Option<String>,
}

impl NewEvent {
    pub fn new(kind: WorkerEventKind) -> Self {
        Self {
            kind,
            worker_id: None,
            worker_type: None,
            execution_mode: None,
            message: None,
            metadata: None,
            session_id: None,
        }
    }

    pub fn worker(mut self, worker_id: i64, worker_type: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id);
        self.worker_type = Some(worker_type.into());
        self
    }

    pub fn worker_type(mut self, worker_type: impl Into<String>) -> Self {
        self.worker_type = Some(worker_type.into());
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A logged event row.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub id: i64,
    pub kind: WorkerEventKind,
    pub worker_id: Option<i64>,
    pub worker_type: Option<String>,
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub created_at: u64,
}

impl<C: Clock> JobQueue<C> {
    /// Append one lifecycle event. Never fails the caller: append errors
    /// are traced and dropped.
    pub fn log_event(&self, event: NewEvent) {
        if let Err(e) = self.try_log_event(&event) {
            tracing::warn!(error = %e, kind = %event.kind, "failed to append worker event");
        }
    }

    fn try_log_event(&self, event: &NewEvent) -> Result<(), StoreError> {
        let metadata = event.metadata.as_ref().map(serde_json::Value::to_string);
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO worker_events
                 (event_type, worker_id, worker_type, execution_mode, message, metadata,
                  session_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.kind.as_str(),
                event.worker_id,
                event.worker_type,
                event.execution_mode.map(|m| m.as_str()),
                event.message,
                metadata,
                event.session_id,
                self.clock.epoch_ms(),
            ],
        )?;
        Ok(())
    }

    /// Events for one worker session, oldest first.
    pub fn events_for_session(&self, session_id: &str) -> Result<Vec<LoggedEvent>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_type, worker_id, worker_type, message, session_id, created_at
             FROM worker_events WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            let kind_text: String = row.get(1)?;
            Ok((
                row.get::<_, i64>(0)?,
                kind_text,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, u64>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, kind_text, worker_id, worker_type, message, session_id, created_at) = row?;
            let kind = WorkerEventKind::parse(&kind_text).ok_or_else(|| {
                StoreError::Corrupt(format!("unknown event type '{kind_text}'"))
            })?;
            out.push(LoggedEvent {
                id,
                kind,
                worker_id,
                worker_type,
                message,
                session_id,
                created_at,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
