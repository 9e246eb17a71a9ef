// SPDX-License-Identifier: MIT

//! Re-running an unchanged build dispatches nothing and leaves
//! byte-identical outputs.

use crate::prelude::*;
use lectern_build::{Format, Kind, OutputTarget};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn unchanged_rerun_is_pure_cache() {
    let mut world = World::new();
    let (course, _input) = world.course_with_file("topic", "let x = 1;");
    world.start_worker("notebook", TaggingConverter::default());

    let target = OutputTarget::new(world.out_dir())
        .languages(["en"])
        .formats([Format::Notebook])
        .kinds([Kind::Completed]);
    let targets = [target];

    let orchestrator = world.orchestrator();
    let cancel = CancellationToken::new();
    orchestrator.build(&course, &targets, &cancel).await.expect("first build");

    let output = world.out_dir().join("en/notebooks/completed/topic.ipynb");
    let first_bytes = std::fs::read(&output).expect("first output");
    let jobs_after_first = world.queue.job_counts().expect("counts").completed;
    assert_eq!(jobs_after_first, 1);

    // Second build over the same inputs: no new jobs, identical bytes.
    // A fresh backend proves the hit comes from the store, not memory.
    let orchestrator = world.orchestrator();
    let outcome = orchestrator.build(&course, &targets, &cancel).await.expect("second build");
    assert!(outcome.success());

    let counts = world.queue.job_counts().expect("counts");
    assert_eq!(counts.completed, 1, "no new worker dispatches");
    assert_eq!(std::fs::read(&output).expect("second output"), first_bytes);

    // The cache row was touched again.
    let job = world.queue.get_job(1).expect("job");
    let conn = world.queue.store().connect().expect("conn");
    let access_count: u64 = conn
        .query_row(
            "SELECT access_count FROM result_cache WHERE content_hash = ?1",
            [&job.content_hash],
            |row| row.get(0),
        )
        .expect("cache row");
    assert!(access_count >= 2, "access_count advanced: {access_count}");
}

#[tokio::test]
async fn changed_input_misses_the_cache() {
    let mut world = World::new();
    let (course, input) = world.course_with_file("topic", "v1");
    world.start_worker("notebook", TaggingConverter::default());

    let target = OutputTarget::new(world.out_dir())
        .languages(["en"])
        .formats([Format::Notebook])
        .kinds([Kind::Completed]);
    let targets = [target];
    let cancel = CancellationToken::new();

    world.orchestrator().build(&course, &targets, &cancel).await.expect("first build");
    std::fs::write(&input, "v2").expect("edit input");
    world.orchestrator().build(&course, &targets, &cancel).await.expect("second build");

    let counts = world.queue.job_counts().expect("counts");
    assert_eq!(counts.completed, 2, "changed hash dispatches a fresh job");

    let output = world.out_dir().join("en/notebooks/completed/topic.ipynb");
    assert_eq!(
        std::fs::read_to_string(&output).expect("output"),
        "notebook/completed|v2"
    );
}
