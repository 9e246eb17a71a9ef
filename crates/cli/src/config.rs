// SPDX-License-Identifier: MIT

//! Driver configuration (`lectern.toml`).
//!
//! Everything has a default so a bare `lectern build course.toml` works;
//! the file exists to pin worker pools, converter commands, and watch
//! behavior per project.

use lectern_build::{Format, Kind, OutputTarget};
use lectern_core::ExecutionMode;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Job/worker coordination store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Tier-1 stored-result store.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Root of input/output files.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default, rename = "pool")]
    pub pools: Vec<PoolEntry>,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
    #[serde(default)]
    pub build: BuildEntry,
    #[serde(default)]
    pub watch: WatchEntry,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("jobs.db")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("cache.db")
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolEntry {
    pub job_type: String,
    #[serde(default = "default_pool_count")]
    pub count: usize,
    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,
    /// Converter command template; `{input}` / `{output}` substituted per
    /// job. First element is the program.
    pub command: Vec<String>,
    /// Container image, for docker-mode pools.
    pub image: Option<String>,
}

fn default_pool_count() -> usize {
    1
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Direct
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub path: PathBuf,
    pub languages: Option<HashSet<String>>,
    pub formats: Option<HashSet<Format>>,
    pub kinds: Option<HashSet<Kind>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildEntry {
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default = "default_true")]
    pub reuse_workers: bool,
}

impl Default for BuildEntry {
    fn default() -> Self {
        Self { fail_fast: false, reuse_workers: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchEntry {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub fast_mode: bool,
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for WatchEntry {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), fast_mode: false }
    }
}

impl Config {
    /// Load from `path`, or all defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// The configured output targets, or one default target when none are
    /// configured.
    pub fn output_targets(&self, fallback: &Path) -> Vec<OutputTarget> {
        if self.targets.is_empty() {
            return vec![OutputTarget::new(fallback)];
        }
        self.targets
            .iter()
            .map(|t| OutputTarget {
                path: t.path.clone(),
                languages: t.languages.clone(),
                formats: t.formats.clone(),
                kinds: t.kinds.clone(),
            })
            .collect()
    }

    /// The converter command for a job type, if configured.
    pub fn converter_command(&self, job_type: &str) -> Option<&[String]> {
        self.pools
            .iter()
            .find(|p| p.job_type == job_type)
            .map(|p| p.command.as_slice())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_path: default_cache_path(),
            workspace: default_workspace(),
            pools: Vec::new(),
            targets: Vec::new(),
            build: BuildEntry::default(),
            watch: WatchEntry::default(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
