// SPDX-License-Identifier: MIT

//! Four workers over forty pending jobs: every job completes exactly once
//! and the work is actually spread.

use crate::prelude::*;
use lectern_core::{JobPayload, JobStatus, JobType, NewJob};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn forty_jobs_four_workers_no_double_claims() {
    const JOBS: usize = 40;
    const WORKERS: usize = 4;

    let mut world = World::new();
    let mut job_ids = Vec::new();
    for i in 0..JOBS {
        let input = world.dir.path().join(format!("in_{i}.src"));
        std::fs::write(&input, format!("job {i}")).expect("input");
        let output = world.dir.path().join(format!("out/{i}.ipynb"));
        let payload = JobPayload::new(&input, &output, "cor-batch");
        let id = world
            .queue
            .add_job(&NewJob::from_payload(JobType::Notebook, format!("h{i}"), payload))
            .expect("add job");
        job_ids.push(id);
    }

    let worker_ids: Vec<i64> = (0..WORKERS)
        .map(|_| world.start_worker("notebook", TaggingConverter::default()))
        .collect();

    // Wait until every job is terminal.
    for _ in 0..1000 {
        let counts = world.queue.job_counts().expect("counts");
        if counts.completed as usize == JOBS {
            break;
        }
        assert_eq!(counts.failed, 0, "no job may fail");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let counts = world.queue.job_counts().expect("counts");
    assert_eq!(counts.completed as usize, JOBS, "all jobs completed");

    // No double claims: every row names exactly one worker, and the
    // per-worker tallies add up to the job count.
    let mut per_worker: HashMap<i64, usize> = HashMap::new();
    for &id in &job_ids {
        let job = world.queue.get_job(id).expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        let worker = job.worker_id.expect("every completed job names its worker");
        assert!(worker_ids.contains(&worker), "unknown worker {worker}");
        *per_worker.entry(worker).or_default() += 1;
    }
    let total: usize = per_worker.values().sum();
    assert_eq!(total, JOBS);

    let tallies: u64 = worker_ids
        .iter()
        .map(|&w| world.queue.get_worker(w).expect("worker").jobs_processed)
        .sum();
    assert_eq!(tallies as usize, JOBS, "worker counters agree with job rows");
}
