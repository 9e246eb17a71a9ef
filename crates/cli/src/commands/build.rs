// SPDX-License-Identifier: MIT

//! The build command: start workers, drive the orchestrator, optionally
//! stay resident in watch mode, tear everything down.

use crate::config::Config;
use crate::{EXIT_FATAL, EXIT_JOBS_FAILED, EXIT_OK};
use clap::Args;
use lectern_build::{
    Backend, BackendConfig, BuildError, BuildReporter, Course, Orchestrator,
    ShutdownCoordinator, WatchConfig, WatchCoordinator,
};
use lectern_core::{ExecutionMode, SystemClock};
use lectern_pool::{
    DockerExecutor, LifecycleManager, PoolConfig, PoolManager, SessionMode,
    SubprocessExecutor, WorkerCommand,
};
use lectern_store::{JobQueue, ResultStore, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct BuildArgs {
    /// Course spec (course.toml).
    pub course: PathBuf,

    /// Rebuild changed files until interrupted.
    #[arg(long)]
    pub watch: bool,

    /// Output directory when no targets are configured.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Abort on the first failed stage.
    #[arg(long)]
    pub fail_fast: bool,

    /// Always start a fresh worker pool instead of reusing survivors.
    #[arg(long)]
    pub no_reuse_workers: bool,

    /// Path of this config file, forwarded to spawned workers.
    #[arg(skip)]
    pub config_path: PathBuf,
}

pub async fn run(config: &Config, args: BuildArgs) -> anyhow::Result<i32> {
    let course = Course::load(&args.course)?;
    let fallback_output =
        args.output.clone().unwrap_or_else(|| course.root.join("output"));
    let targets = config.output_targets(&fallback_output);

    let store = Store::open(&config.db_path)?;
    let queue = JobQueue::new(store, SystemClock);
    let results = ResultStore::open(&config.cache_path, SystemClock)?;
    let reporter = Arc::new(BuildReporter::new());

    // Signals must be owned before any long-running loop starts.
    let shutdown = ShutdownCoordinator::install(Arc::clone(&reporter));
    let cancel = shutdown.token();

    let mode = if args.no_reuse_workers || !config.build.reuse_workers {
        SessionMode::Managed
    } else {
        SessionMode::Mixed
    };
    let lifecycle = start_workers(config, &args.config_path, queue.clone(), mode).await?;

    let monitor_stop = CancellationToken::new();
    let monitor = {
        let manager = lifecycle.manager();
        let stop = monitor_stop.clone();
        tokio::spawn(async move { manager.run_monitor(stop).await })
    };

    let backend =
        Backend::new(queue.clone(), results, Arc::clone(&reporter), BackendConfig::default());
    let mut orchestrator = Orchestrator::new(backend);
    orchestrator.fail_fast = args.fail_fast || config.build.fail_fast;

    let build_result = orchestrator.build(&course, &targets, &cancel).await;

    let watch_result = match (&build_result, args.watch) {
        (Ok(_), true) => {
            let watch_config = WatchConfig {
                debounce: Duration::from_millis(config.watch.debounce_ms),
                fast_mode: config.watch.fast_mode,
                ..WatchConfig::default()
            };
            let watch_targets = watch_config.effective_targets(&targets);
            let coordinator = WatchCoordinator::new(watch_config);
            let orchestrator = &orchestrator;
            let course_ref = &course;
            Some(
                coordinator
                    .run(&course.root, cancel.clone(), move |path| {
                        let targets = watch_targets.clone();
                        let cancel = cancel.clone();
                        async move {
                            orchestrator
                                .rebuild_file(course_ref, &path, &targets, &cancel)
                                .await
                                .map(|outcome| {
                                    tracing::info!(
                                        success = outcome.success(),
                                        operations = outcome.operations,
                                        "incremental rebuild finished"
                                    );
                                })
                        }
                    })
                    .await,
            )
        }
        _ => None,
    };

    monitor_stop.cancel();
    monitor.await.ok();
    lifecycle.stop_managed().await?;
    shutdown.finish();

    let (completed, failed, cancelled, cache_hits) = reporter.counts();
    println!(
        "build: {completed} completed, {failed} failed, {cancelled} cancelled, {cache_hits} cache hits"
    );

    match (build_result, watch_result) {
        (Err(BuildError::Cancelled), _) => {
            println!("build cancelled");
            Ok(130)
        }
        (Err(e), _) => Err(e.into()),
        (Ok(_), Some(Err(e))) => {
            eprintln!("watch failed: {e}");
            Ok(EXIT_FATAL)
        }
        (Ok(outcome), _) => {
            if outcome.success() && failed == 0 {
                Ok(EXIT_OK)
            } else {
                Ok(EXIT_JOBS_FAILED)
            }
        }
    }
}

/// Assemble executors and start (or reuse) the configured pools.
async fn start_workers(
    config: &Config,
    config_path: &std::path::Path,
    queue: JobQueue<SystemClock>,
    mode: SessionMode,
) -> anyhow::Result<LifecycleManager<SystemClock>> {
    let mut pool_config = PoolConfig::new(&config.db_path, &config.workspace);
    for pool in &config.pools {
        pool_config = pool_config.pool(&pool.job_type, pool.count, pool.mode);
    }
    if config.pools.is_empty() {
        tracing::warn!("no worker pools configured; jobs will find no workers");
    }

    let worker_command = WorkerCommand::current_exe(vec![
        "worker".to_string(),
        "--config".to_string(),
        config_path.display().to_string(),
    ])?;
    let mut manager = PoolManager::new(queue, pool_config).with_executor(
        ExecutionMode::Direct,
        Arc::new(SubprocessExecutor::new(worker_command)),
    );

    if config.pools.iter().any(|p| p.mode == ExecutionMode::Docker) {
        let mut docker = DockerExecutor::new("lectern-worker:latest");
        for pool in &config.pools {
            if let Some(image) = &pool.image {
                docker = docker.with_image_for(&pool.job_type, image);
            }
        }
        manager = manager.with_executor(ExecutionMode::Docker, Arc::new(docker));
    }

    let lifecycle = LifecycleManager::new(manager, mode);
    let report = lifecycle.start_managed().await?;
    if !report.all_started() {
        for (worker_type, error) in &report.failed {
            tracing::error!(worker_type = %worker_type, error = %error, "worker failed to start");
        }
        anyhow::bail!("{} worker(s) failed to start", report.failed.len());
    }
    Ok(lifecycle)
}
