// SPDX-License-Identifier: MIT

//! One input, one target, one worker: the full pending→processing→
//! completed arc with outputs and cache entries in place.

use crate::prelude::*;
use lectern_build::{Format, Kind, OutputTarget};
use lectern_core::JobStatus;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn one_file_one_worker_builds_one_notebook() {
    let mut world = World::new();
    let (course, _input) = world.course_with_file("topic", "fn main() {}");
    world.start_worker("notebook", TaggingConverter::default());

    let target = OutputTarget::new(world.out_dir())
        .languages(["en"])
        .formats([Format::Notebook])
        .kinds([Kind::Completed]);

    let orchestrator = world.orchestrator();
    let outcome = orchestrator
        .build(&course, &[target], &CancellationToken::new())
        .await
        .expect("build");

    assert!(outcome.success());
    assert_eq!(outcome.operations, 1);

    // Exactly one job row, completed.
    let counts = world.queue.job_counts().expect("counts");
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.pending + counts.processing + counts.failed + counts.cancelled, 0);

    // The artifact is on disk with converter output.
    let output = world.out_dir().join("en/notebooks/completed/topic.ipynb");
    let content = std::fs::read_to_string(&output).expect("output file");
    assert_eq!(content, "notebook/completed|fn main() {}");

    // Cache entry exists for (output, hash).
    let job = world.queue.get_job(1).expect("job row");
    assert_eq!(job.status, JobStatus::Completed);
    assert!(world
        .queue
        .check_cache(&output, &job.content_hash)
        .expect("cache probe")
        .is_some());

    // The worker counted its work.
    let worker = world.queue.get_worker(job.worker_id.expect("worker id")).expect("worker");
    assert_eq!(worker.jobs_processed, 1);
    assert_eq!(worker.jobs_failed, 0);
}
