// SPDX-License-Identifier: MIT

use super::*;
use crate::store::Store;
use lectern_core::{ExecutionMode, FakeClock, WorkerEventKind};
use tempfile::TempDir;

fn queue() -> (TempDir, JobQueue<FakeClock>) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("jobs.db")).unwrap();
    (dir, JobQueue::new(store, FakeClock::new()))
}

#[test]
fn events_are_appended_and_queryable_by_session() {
    let (_dir, queue) = queue();
    queue.log_event(
        NewEvent::new(WorkerEventKind::PoolStarting).session("ses-a").message("2 workers"),
    );
    queue.log_event(
        NewEvent::new(WorkerEventKind::WorkerRegistered)
            .worker(7, "notebook")
            .execution_mode(ExecutionMode::Direct)
            .session("ses-a"),
    );
    queue.log_event(NewEvent::new(WorkerEventKind::PoolStarting).session("ses-b"));

    let events = queue.events_for_session("ses-a").unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, WorkerEventKind::PoolStarting);
    assert_eq!(events[0].message.as_deref(), Some("2 workers"));
    assert_eq!(events[1].kind, WorkerEventKind::WorkerRegistered);
    assert_eq!(events[1].worker_id, Some(7));
    assert_eq!(events[1].worker_type.as_deref(), Some("notebook"));
}

#[test]
fn metadata_is_stored_as_json() {
    let (_dir, queue) = queue();
    queue.log_event(
        NewEvent::new(WorkerEventKind::WorkerFailed)
            .worker_type("plantuml")
            .metadata(serde_json::json!({"exit_code": 137}))
            .session("ses-a"),
    );
    let events = queue.events_for_session("ses-a").unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, WorkerEventKind::WorkerFailed);
}

#[test]
fn ordering_is_insertion_order() {
    let (_dir, queue) = queue();
    for kind in [
        WorkerEventKind::PoolStarting,
        WorkerEventKind::WorkerStarting,
        WorkerEventKind::WorkerReady,
        WorkerEventKind::PoolStarted,
    ] {
        queue.log_event(NewEvent::new(kind).session("ses-a"));
    }
    let kinds: Vec<WorkerEventKind> =
        queue.events_for_session("ses-a").unwrap().into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            WorkerEventKind::PoolStarting,
            WorkerEventKind::WorkerStarting,
            WorkerEventKind::WorkerReady,
            WorkerEventKind::PoolStarted,
        ]
    );
}
