// SPDX-License-Identifier: MIT

//! Supersession: cancelling an input's in-flight job and submitting a
//! replacement leaves exactly one winner.

use crate::prelude::*;
use lectern_core::{JobPayload, JobStatus, JobType, NewJob};
use std::time::Duration;

#[tokio::test]
async fn newer_submission_supersedes_processing_job() {
    let mut world = World::new();
    let input = world.dir.path().join("topic.src");
    std::fs::write(&input, "first version").expect("input");
    let output = world.dir.path().join("out/topic.ipynb");

    // J1 with a slow converter so it is processing when we supersede it.
    let payload = JobPayload::new(&input, &output, "cor-1");
    let j1 = world
        .queue
        .add_job(&NewJob::from_payload(JobType::Notebook, "hash-v1", payload))
        .expect("add j1");
    world.start_worker(
        "notebook",
        TaggingConverter { delay: Duration::from_millis(800) },
    );

    // Wait for the claim.
    for _ in 0..500 {
        if world.queue.get_job(j1).expect("j1").status == JobStatus::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(world.queue.get_job(j1).expect("j1").status, JobStatus::Processing);

    // Supersede and submit J2 with new content.
    std::fs::write(&input, "second version").expect("rewrite input");
    let cancelled = world.queue.cancel_for_input(&input, "cor-2").expect("cancel");
    assert_eq!(cancelled, vec![j1]);

    let payload = JobPayload::new(&input, &output, "cor-2");
    let j2 = world
        .queue
        .add_job(&NewJob::from_payload(JobType::Notebook, "hash-v2", payload))
        .expect("add j2");

    // J2 completes; J1 stays cancelled forever.
    for _ in 0..1000 {
        if world.queue.get_job(j2).expect("j2").status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let j1_row = world.queue.get_job(j1).expect("j1");
    assert_eq!(j1_row.status, JobStatus::Cancelled);
    assert_eq!(j1_row.cancelled_by.as_deref(), Some("cor-2"));
    assert!(j1_row.cancelled_at.is_some());

    let j2_row = world.queue.get_job(j2).expect("j2");
    assert_eq!(j2_row.status, JobStatus::Completed);

    // The artifact reflects J2's content, not the superseded work.
    let content = std::fs::read_to_string(&output).expect("output");
    assert_eq!(content, "raw/-|second version");
}
