// SPDX-License-Identifier: MIT

use super::*;
use lectern_core::error::Classify;
use lectern_core::ErrorClass;

fn busy_error() -> StoreError {
    StoreError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        Some("database is locked".to_string()),
    ))
}

#[test]
fn busy_is_detected_and_transient() {
    let err = busy_error();
    assert!(err.is_busy());
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[test]
fn duplicate_is_user_class() {
    let err = StoreError::DuplicateJob {
        output_file: "/out/a.ipynb".to_string(),
        content_hash: "abc".to_string(),
    };
    assert!(!err.is_busy());
    assert_eq!(err.class(), ErrorClass::User);
}

#[test]
fn retry_gives_up_after_budget() {
    let mut calls = 0;
    let result: Result<(), StoreError> = with_busy_retry(|| {
        calls += 1;
        Err(busy_error())
    });
    assert!(result.is_err());
    assert_eq!(calls, 7, "initial call plus six retries");
}

#[test]
fn retry_passes_through_success() {
    let mut calls = 0;
    let result = with_busy_retry(|| {
        calls += 1;
        if calls < 3 {
            Err(busy_error())
        } else {
            Ok(calls)
        }
    });
    assert_eq!(result.unwrap(), 3);
}

#[test]
fn retry_does_not_retry_hard_errors() {
    let mut calls = 0;
    let result: Result<(), StoreError> = with_busy_retry(|| {
        calls += 1;
        Err(StoreError::JobNotFound(7))
    });
    assert!(matches!(result, Err(StoreError::JobNotFound(7))));
    assert_eq!(calls, 1);
}
