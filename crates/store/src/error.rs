// SPDX-License-Identifier: MIT

//! Store errors and busy-retry discipline.

use lectern_core::error::{Classify, ErrorClass};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("duplicate job for {output_file} ({content_hash})")]
    DuplicateJob { output_file: String, content_hash: String },
    #[error("job {0} not found")]
    JobNotFound(i64),
    #[error("worker {0} not found")]
    WorkerNotFound(i64),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("payload serialization: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("blob io: {0}")]
    Blob(#[from] std::io::Error),
    #[error("unsupported result envelope version {0}")]
    EnvelopeVersion(u16),
}

impl StoreError {
    /// True for SQLITE_BUSY / SQLITE_LOCKED, which callers retry with backoff.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        if self.is_busy() {
            return ErrorClass::Transient;
        }
        match self {
            StoreError::DuplicateJob { .. } => ErrorClass::User,
            _ => ErrorClass::Infrastructure,
        }
    }
}

/// Base delay for busy retries; doubles per attempt up to [`MAX_BACKOFF`].
const BASE_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(250);
const MAX_ATTEMPTS: u32 = 6;

/// Run `op`, retrying on transient busy errors with capped exponential
/// backoff and a small deterministic jitter.
///
/// Blocking: intended for worker-side loops and short driver transactions
/// (the connection-level busy timeout absorbs most contention first).
pub fn with_busy_retry<T>(
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Err(e) if e.is_busy() && attempt < MAX_ATTEMPTS => {
                let exp = BASE_BACKOFF.saturating_mul(1 << attempt.min(5));
                let delay = exp.min(MAX_BACKOFF);
                // Jitter off the wall clock's sub-millisecond bits.
                let jitter_us = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| (d.subsec_nanos() / 1000) % 997)
                    .unwrap_or(0);
                std::thread::sleep(delay + Duration::from_micros(u64::from(jitter_us)));
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
