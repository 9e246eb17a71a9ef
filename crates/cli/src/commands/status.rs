// SPDX-License-Identifier: MIT

//! Snapshot of worker and job counts.

use crate::config::Config;
use crate::EXIT_OK;
use lectern_core::SystemClock;
use lectern_store::{JobQueue, Store};

pub fn run(config: &Config, session: Option<&str>) -> anyhow::Result<i32> {
    let store = Store::open(&config.db_path)?;
    let queue = JobQueue::new(store, SystemClock);

    let workers = queue.worker_counts()?;
    println!("workers:");
    if workers.is_empty() {
        println!("  (none)");
    }
    for (status, count) in workers {
        println!("  {status:<10} {count}");
    }

    let jobs = queue.job_counts()?;
    println!("jobs:");
    println!("  pending    {}", jobs.pending);
    println!("  processing {}", jobs.processing);
    println!("  completed  {}", jobs.completed);
    println!("  failed     {}", jobs.failed);
    println!("  cancelled  {}", jobs.cancelled);

    if let Some(session) = session {
        println!("events for {session}:");
        let events = queue.events_for_session(session)?;
        if events.is_empty() {
            println!("  (none)");
        }
        for event in events {
            let worker = event
                .worker_id
                .map(|id| format!(" worker={id}"))
                .unwrap_or_default();
            let message = event.message.map(|m| format!(" {m}")).unwrap_or_default();
            println!("  {}{}{}", event.kind, worker, message);
        }
    }

    Ok(EXIT_OK)
}
