// SPDX-License-Identifier: MIT

//! Reuse-vs-start session policy.

use super::*;
use crate::error::ExecutorError;
use crate::executor::{ExecutorStats, StartSpec, WorkerExecutor};
use crate::manager::{PoolConfig, PoolManager};
use async_trait::async_trait;
use lectern_core::{ExecutionMode, FakeClock};
use lectern_store::{JobQueue, Store};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Clone, Default)]
struct CountingExecutor {
    started: Arc<Mutex<usize>>,
}

#[async_trait]
impl WorkerExecutor for CountingExecutor {
    async fn start(&self, spec: &StartSpec) -> Result<String, ExecutorError> {
        let mut n = self.started.lock();
        *n += 1;
        Ok(format!("cnt-{}-{}", spec.worker_type, *n))
    }

    async fn stop(&self, _executor_id: &str, _grace: Duration) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn is_alive(&self, _executor_id: &str) -> Result<bool, ExecutorError> {
        Ok(true)
    }

    async fn stats(&self, _executor_id: &str) -> Result<Option<ExecutorStats>, ExecutorError> {
        Ok(None)
    }
}

struct Harness {
    _dir: TempDir,
    queue: JobQueue<FakeClock>,
    executor: CountingExecutor,
    clock: FakeClock,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("jobs.db")).unwrap();
    let clock = FakeClock::new();
    let queue = JobQueue::new(store, clock.clone());
    Harness { _dir: dir, queue, executor: CountingExecutor::default(), clock }
}

fn lifecycle(h: &Harness, count: usize, mode: SessionMode) -> LifecycleManager<FakeClock> {
    let config = PoolConfig::new("/tmp/jobs.db", "/tmp")
        .pool("notebook", count, ExecutionMode::Direct);
    let manager = PoolManager::new(h.queue.clone(), config)
        .with_executor(ExecutionMode::Direct, Arc::new(h.executor.clone()));
    LifecycleManager::new(manager, mode)
}

fn seed_idle_worker(h: &Harness) -> i64 {
    let id = h
        .queue
        .pre_register("notebook", ExecutionMode::Direct, None, 1, "ses-prior")
        .unwrap();
    h.queue.activate(id).unwrap();
    id
}

#[tokio::test]
async fn managed_mode_starts_full_count_even_with_survivors() {
    let h = harness();
    seed_idle_worker(&h);
    let lifecycle = lifecycle(&h, 2, SessionMode::Managed);

    assert!(lifecycle.should_start_workers().unwrap());
    let report = lifecycle.start_managed().await.unwrap();
    assert_eq!(report.started.len(), 2);
}

#[tokio::test]
async fn persistent_mode_never_starts() {
    let h = harness();
    let lifecycle = lifecycle(&h, 2, SessionMode::Persistent);

    assert!(!lifecycle.should_start_workers().unwrap());
    let report = lifecycle.start_managed().await.unwrap();
    assert!(report.started.is_empty());
    assert_eq!(*h.executor.started.lock(), 0);
}

#[tokio::test]
async fn mixed_mode_starts_only_the_deficit() {
    let h = harness();
    seed_idle_worker(&h);
    let lifecycle = lifecycle(&h, 3, SessionMode::Mixed);

    let report = lifecycle.start_managed().await.unwrap();
    assert_eq!(report.started.len(), 2, "one healthy survivor, two to start");
}

#[tokio::test]
async fn mixed_mode_ignores_stale_survivors() {
    let h = harness();
    seed_idle_worker(&h);
    h.clock.advance(Duration::from_secs(60));
    let lifecycle = lifecycle(&h, 2, SessionMode::Mixed);

    let report = lifecycle.start_managed().await.unwrap();
    assert_eq!(report.started.len(), 2, "stale heartbeat does not count as staffed");
}

#[tokio::test]
async fn mixed_mode_fully_staffed_is_a_noop() {
    let h = harness();
    seed_idle_worker(&h);
    seed_idle_worker(&h);
    let lifecycle = lifecycle(&h, 2, SessionMode::Mixed);

    assert!(!lifecycle.should_start_workers().unwrap());
    let report = lifecycle.start_managed().await.unwrap();
    assert!(report.started.is_empty());
}

#[tokio::test]
async fn persistent_stop_leaves_workers() {
    let h = harness();
    let survivor = seed_idle_worker(&h);
    let lifecycle = lifecycle(&h, 1, SessionMode::Persistent);

    lifecycle.stop_managed().await.unwrap();
    assert!(h.queue.get_worker(survivor).is_ok());
}

#[tokio::test]
async fn managed_stop_removes_own_workers_only() {
    let h = harness();
    let survivor = seed_idle_worker(&h);
    let lifecycle = lifecycle(&h, 2, SessionMode::Managed);
    lifecycle.start_managed().await.unwrap();

    lifecycle.stop_managed().await.unwrap();

    let remaining = h.queue.workers_of_type("notebook").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, survivor, "prior-session worker untouched");
}
