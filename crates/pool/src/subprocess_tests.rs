// SPDX-License-Identifier: MIT

#![cfg(unix)]

use super::*;

fn sleep_spec() -> StartSpec {
    StartSpec {
        worker_type: "notebook".to_string(),
        index: 0,
        worker_id: 1,
        db_path: "/tmp/jobs.db".into(),
        workspace_path: "/tmp".into(),
        log_level: "info".to_string(),
        parent_pid: std::process::id(),
    }
}

fn sleeper() -> SubprocessExecutor {
    SubprocessExecutor::new(WorkerCommand {
        program: "/bin/sleep".to_string(),
        args: vec!["30".to_string()],
    })
}

#[tokio::test]
async fn start_returns_unique_typed_ids() {
    let executor = sleeper();
    let a = executor.start(&sleep_spec()).await.unwrap();
    let b = executor.start(&sleep_spec()).await.unwrap();
    assert_ne!(a, b);
    assert!(a.starts_with("wrk-notebook-"));

    executor.stop(&a, Duration::from_millis(200)).await.unwrap();
    executor.stop(&b, Duration::from_millis(200)).await.unwrap();
}

#[tokio::test]
async fn spawned_process_is_alive_until_stopped() {
    let executor = sleeper();
    let id = executor.start(&sleep_spec()).await.unwrap();
    assert!(executor.is_alive(&id).await.unwrap());

    executor.stop(&id, Duration::from_secs(2)).await.unwrap();
    assert!(!executor.is_alive(&id).await.unwrap());
}

#[tokio::test]
async fn stop_unknown_id_is_silent() {
    let executor = sleeper();
    executor.stop("wrk-notebook-missing", Duration::from_millis(50)).await.unwrap();
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let executor = SubprocessExecutor::new(WorkerCommand {
        program: "/nonexistent/worker-binary".to_string(),
        args: vec![],
    });
    let err = executor.start(&sleep_spec()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::SpawnFailed(_)), "unexpected: {err}");
}

#[tokio::test]
async fn stats_are_unsupported() {
    let executor = sleeper();
    assert!(executor.stats("anything").await.unwrap().is_none());
}

#[test]
fn current_process_is_alive_by_probe() {
    assert!(process_alive(std::process::id()));
}

#[test]
fn impossible_pid_is_not_alive() {
    // Above any kernel's pid_max.
    assert!(!process_alive(0x7fff_fff0));
}
