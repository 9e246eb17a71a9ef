// SPDX-License-Identifier: MIT

//! Requesting only completed html schedules the speaker execution
//! implicitly; only the requested output lands in the target tree.

use crate::prelude::*;
use lectern_build::{Format, Kind, OutputTarget};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn completed_html_pulls_speaker_run_into_the_cache_tree() {
    let mut world = World::new();
    let (course, _input) = world.course_with_file("topic", "print('hi')");
    world.start_worker("notebook", TaggingConverter::default());

    let target = OutputTarget::new(world.out_dir())
        .languages(["en"])
        .formats([Format::Html])
        .kinds([Kind::Completed]);
    let targets = [target];
    let cancel = CancellationToken::new();

    let outcome = world
        .orchestrator()
        .build(&course, &targets, &cancel)
        .await
        .expect("build");
    assert!(outcome.success());
    assert_eq!(outcome.operations, 2, "requested + implicit");

    // The requested output is in the target tree.
    let completed = world.out_dir().join("en/html/completed/topic.html");
    assert_eq!(
        std::fs::read_to_string(&completed).expect("completed html"),
        "html/completed|print('hi')"
    );

    // The speaker run happened, but outside the user-visible tree.
    let speaker_visible = world.out_dir().join("en/html/speaker/topic.html");
    assert!(!speaker_visible.exists(), "implicit outputs are not user-visible");
    let speaker_cached = world.out_dir().join(".cache/en/html/speaker/topic.html");
    assert!(speaker_cached.exists(), "implicit output landed in the cache tree");

    // Both executions are job rows; both completed.
    let counts = world.queue.job_counts().expect("counts");
    assert_eq!(counts.completed, 2);

    // An unchanged re-request is served from cache with no new jobs.
    let outcome = world
        .orchestrator()
        .build(&course, &targets, &cancel)
        .await
        .expect("rebuild");
    assert!(outcome.success());
    assert_eq!(world.queue.job_counts().expect("counts").completed, 2);
}
