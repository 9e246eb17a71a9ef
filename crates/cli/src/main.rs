// SPDX-License-Identifier: MIT

//! `lectern` — course-content build driver.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exit codes: 0 success, 1 completed with failed jobs, 2 fatal.
pub const EXIT_OK: i32 = 0;
pub const EXIT_JOBS_FAILED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Parser)]
#[command(name = "lectern", about = "Course-content build system", version)]
struct Cli {
    /// Driver configuration file.
    #[arg(long, global = true, default_value = "lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a course into its output targets.
    Build(commands::build::BuildArgs),
    /// Worker and job counts by status.
    Status {
        /// Also print the lifecycle events of one worker session.
        #[arg(long)]
        session: Option<String>,
    },
    /// Supersede in-flight jobs for an input file.
    Cancel {
        /// Input file whose jobs should be cancelled.
        input: PathBuf,
    },
    /// Sweep stale worker rows and optionally prune old terminal jobs.
    Cleanup {
        /// Also delete terminal job rows older than this many days.
        #[arg(long)]
        retention_days: Option<u64>,
    },
    /// Run a worker poll loop (spawned by the driver, not for direct use).
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config = match config::Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let result = match cli.command {
        Command::Build(mut args) => {
            args.config_path = cli.config.clone();
            commands::build::run(&config, args).await
        }
        Command::Status { session } => commands::status::run(&config, session.as_deref()),
        Command::Cancel { input } => commands::maintenance::cancel(&config, &input),
        Command::Cleanup { retention_days } => {
            commands::maintenance::cleanup(&config, retention_days)
        }
        Command::Worker => commands::worker::run(&config).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
