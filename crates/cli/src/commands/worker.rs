// SPDX-License-Identifier: MIT

//! The worker-process entry point.
//!
//! Spawned by the subprocess executor (or a container entrypoint) with the
//! worker env contract set. Converters come from the same config file the
//! driver read, looked up by worker type.

use crate::config::Config;
use crate::EXIT_OK;
use lectern_core::SystemClock;
use lectern_store::{JobQueue, ResultStore, Store};
use lectern_worker::{CommandConverter, PollConfig, WorkerEnv, WorkerLoop};
use tokio_util::sync::CancellationToken;

pub async fn run(config: &Config) -> anyhow::Result<i32> {
    let env = WorkerEnv::from_env()?;
    let command = config.converter_command(&env.worker_type).ok_or_else(|| {
        anyhow::anyhow!("no converter command configured for job type '{}'", env.worker_type)
    })?;
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty converter command for '{}'", env.worker_type))?;
    let converter = CommandConverter::new(program.clone(), args.to_vec());

    let store = Store::open(&env.db_path)?;
    let queue = JobQueue::new(store, SystemClock);
    let results = ResultStore::open(&config.cache_path, SystemClock)?;

    let worker = WorkerLoop::bind(queue, Some(results), converter, env, PollConfig::default())?;

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    worker.run(shutdown).await?;
    Ok(EXIT_OK)
}

/// Soft termination: finish or abandon the current job, mark the row dead,
/// exit. The executor hard-kills after its grace if we dawdle.
#[cfg(unix)]
fn spawn_signal_listener(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let Ok(mut terminate) = signal(SignalKind::terminate()) else {
            return;
        };
        let Ok(mut interrupt) = signal(SignalKind::interrupt()) else {
            return;
        };
        tokio::select! {
            _ = terminate.recv() => {}
            _ = interrupt.recv() => {}
        }
        shutdown.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });
}
