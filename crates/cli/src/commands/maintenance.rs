// SPDX-License-Identifier: MIT

//! Cancellation and store maintenance.

use crate::config::Config;
use crate::EXIT_OK;
use lectern_core::{correlation_id, SystemClock};
use lectern_store::{JobQueue, StaleConfig, Store};
use std::path::Path;

pub fn cancel(config: &Config, input: &Path) -> anyhow::Result<i32> {
    let store = Store::open(&config.db_path)?;
    let queue = JobQueue::new(store, SystemClock);
    let cancelled = queue.cancel_for_input(input, &correlation_id())?;
    println!("cancelled {} job(s) for {}", cancelled.len(), input.display());
    Ok(EXIT_OK)
}

pub fn cleanup(config: &Config, retention_days: Option<u64>) -> anyhow::Result<i32> {
    let store = Store::open(&config.db_path)?;
    let queue = JobQueue::new(store, SystemClock);

    let report = queue.cleanup_stale(&StaleConfig::default())?;
    println!(
        "marked {} hung, {} dead candidate(s), {} stale created row(s)",
        report.hung.len(),
        report.dead_candidates.len(),
        report.stale_created.len()
    );
    // Rows the executors cannot vouch for any more are reaped here; the
    // pool manager does the same continuously while a driver runs.
    for record in report.dead_candidates.iter().chain(report.stale_created.iter()) {
        queue.delete_worker(record.id)?;
    }

    if let Some(days) = retention_days {
        let pruned = queue.prune_terminal(days * 24 * 60 * 60 * 1000)?;
        println!("pruned {pruned} terminal job row(s)");
    }
    Ok(EXIT_OK)
}
