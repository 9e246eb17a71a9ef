// SPDX-License-Identifier: MIT

//! Worker rows left behind by a killed driver are reaped by the next
//! driver's cleanup cycle, and deletions are idempotent.

use crate::prelude::*;
use lectern_core::{ExecutionMode, WorkerStatus};
use lectern_store::StaleConfig;

#[tokio::test]
async fn dead_parent_rows_are_reaped_within_one_cycle() {
    let world = World::new();
    let queue = &world.queue;

    // Two workers registered by a driver that then dies: the parent pid
    // is far above any real pid_max.
    let dead_parent = 0x7fff_fff0;
    let a = queue
        .pre_register("notebook", ExecutionMode::Direct, Some("exec-a"), dead_parent, "ses-old")
        .expect("a");
    let b = queue
        .pre_register("notebook", ExecutionMode::Direct, Some("exec-b"), dead_parent, "ses-old")
        .expect("b");
    queue.activate(a).expect("activate a");
    queue.activate(b).expect("activate b");

    // A fresh driver runs a cleanup pass with a zero grace: heartbeats
    // from the dead session are stale immediately. The sleep keeps the
    // millisecond timestamps strictly behind "now".
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let config = StaleConfig { hung_after_ms: 0, dead_after_ms: 0, created_after_ms: 0 };
    let report = queue.cleanup_stale(&config).expect("sweep one");
    assert_eq!(report.hung.len(), 2, "both silent rows marked hung");

    let report = queue.cleanup_stale(&config).expect("sweep two");
    assert_eq!(report.dead_candidates.len(), 2, "hung rows surface for liveness checks");

    // The driver confirms the processes are gone and reaps the rows.
    for record in &report.dead_candidates {
        queue.set_worker_status(record.id, WorkerStatus::Dead).expect("mark dead");
        queue.delete_worker(record.id).expect("delete");
        // Idempotent: a second delete of the same row is a no-op.
        queue.delete_worker(record.id).expect("re-delete");
    }

    assert!(queue.workers_of_type("notebook").expect("list").is_empty());
}

#[tokio::test]
async fn stuck_created_row_of_dead_parent_is_deleted() {
    let world = World::new();
    let queue = &world.queue;

    let dead_parent = 0x7fff_fff0;
    let id = queue
        .pre_register("notebook", ExecutionMode::Direct, None, dead_parent, "ses-old")
        .expect("pre-register");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let config = StaleConfig { created_after_ms: 0, ..StaleConfig::default() };
    let report = queue.cleanup_stale(&config).expect("sweep");
    assert_eq!(report.stale_created.len(), 1);
    assert_eq!(report.stale_created[0].id, id);

    queue.delete_worker(id).expect("reap");
    assert!(queue.get_worker(id).is_err());
}
