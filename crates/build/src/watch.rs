// SPDX-License-Identifier: MIT

//! Watch mode: debounced filesystem events driving single-file rebuilds.
//!
//! The platform watcher runs on its own thread and feeds a channel; all
//! real work is deferred through the task scheduler. Rapid events on one
//! path collapse into a single deferred rebuild; a changed path first
//! supersedes its in-flight jobs, then rebuilds.

use crate::course::{Format, OutputTarget};
use crate::error::BuildError;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Watch-mode tuning.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period before a changed path rebuilds.
    pub debounce: Duration,
    /// Path substrings never worth a rebuild (VCS, outputs, caches).
    pub ignored_dirs: Vec<String>,
    /// Give up after this many consecutive handler failures.
    pub max_consecutive_errors: u32,
    /// Suppress expensive formats during watch to tighten the loop.
    pub fast_mode: bool,
    /// Formats dropped in fast mode.
    pub fast_mode_skips: Vec<Format>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            ignored_dirs: vec![
                ".git".to_string(),
                ".cache".to_string(),
                "target".to_string(),
                "__pycache__".to_string(),
                ".ipynb_checkpoints".to_string(),
            ],
            max_consecutive_errors: 10,
            fast_mode: false,
            fast_mode_skips: vec![Format::Html],
        }
    }
}

impl WatchConfig {
    /// The targets a watch rebuild should use: in fast mode the skipped
    /// formats are subtracted from every target's filter.
    pub fn effective_targets(&self, targets: &[OutputTarget]) -> Vec<OutputTarget> {
        if !self.fast_mode {
            return targets.to_vec();
        }
        targets
            .iter()
            .map(|target| {
                let mut narrowed = target.clone();
                let formats: std::collections::HashSet<Format> = narrowed
                    .formats
                    .clone()
                    .unwrap_or_else(|| Format::ALL.into_iter().collect())
                    .into_iter()
                    .filter(|f| !self.fast_mode_skips.contains(f))
                    .collect();
                narrowed.formats = Some(formats);
                narrowed
            })
            .collect()
    }
}

/// Editor droppings and VCS/output noise that must not trigger rebuilds.
pub(crate) fn is_ignored(path: &Path, ignored_dirs: &[String]) -> bool {
    let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
    if file_name.ends_with('~')
        || file_name.ends_with(".swp")
        || file_name.ends_with(".tmp")
        || file_name.starts_with('.')
    {
        return true;
    }
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|name| ignored_dirs.iter().any(|d| d == name))
            .unwrap_or(false)
    })
}

/// Per-path debouncer: each observation cancels the path's pending timer
/// and arms a new one; only the last observation within the window fires.
pub struct Debouncer {
    delay: Duration,
    pending: HashMap<PathBuf, JoinHandle<()>>,
    fire_tx: mpsc::Sender<PathBuf>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> (Self, mpsc::Receiver<PathBuf>) {
        let (fire_tx, fire_rx) = mpsc::channel(64);
        (Self { delay, pending: HashMap::new(), fire_tx }, fire_rx)
    }

    /// Register an event on `path`, superseding any pending timer for it.
    pub fn observe(&mut self, path: PathBuf) {
        if let Some(previous) = self.pending.remove(&path) {
            previous.abort();
        }
        let delay = self.delay;
        let tx = self.fire_tx.clone();
        let fired = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send(fired).await.ok();
        });
        self.pending.insert(path, handle);
    }

    /// Drop the bookkeeping for a fired path.
    pub fn settle(&mut self, path: &Path) {
        self.pending.remove(path);
    }
}

/// Debounce + cancellation + error-containment coordinator.
pub struct WatchCoordinator {
    config: WatchConfig,
}

impl WatchCoordinator {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }

    /// Watch `root` until cancelled, invoking `rebuild` for each settled
    /// path. After `max_consecutive_errors` handler failures in a row the
    /// watcher stops with a fatal error instead of looping on a broken
    /// state.
    pub async fn run<F, Fut>(
        &self,
        root: &Path,
        cancel: CancellationToken,
        mut rebuild: F,
    ) -> Result<(), BuildError>
    where
        F: FnMut(PathBuf) -> Fut,
        Fut: Future<Output = Result<(), BuildError>>,
    {
        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(256);
        let ignored = self.config.ignored_dirs.clone();
        let mut watcher = notify::recommended_watcher(move |result: Result<NotifyEvent, _>| {
            let Ok(event) = result else { return };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            for path in event.paths {
                if !is_ignored(&path, &ignored) {
                    event_tx.blocking_send(path).ok();
                }
            }
        })
        .map_err(|e| BuildError::Watch(e.to_string()))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| BuildError::Watch(e.to_string()))?;
        tracing::info!(root = %root.display(), "watching for changes");

        let (mut debouncer, mut fire_rx) = Debouncer::new(self.config.debounce);
        let mut consecutive_errors: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                Some(path) = event_rx.recv() => {
                    tracing::debug!(path = %path.display(), "change observed");
                    debouncer.observe(path);
                }
                Some(path) = fire_rx.recv() => {
                    debouncer.settle(&path);
                    tracing::info!(path = %path.display(), "rebuilding changed file");
                    match rebuild(path).await {
                        Ok(()) => consecutive_errors = 0,
                        Err(e) => {
                            consecutive_errors += 1;
                            tracing::error!(
                                error = %e,
                                consecutive = consecutive_errors,
                                "rebuild handler failed"
                            );
                            if consecutive_errors >= self.config.max_consecutive_errors {
                                return Err(BuildError::WatchBroken(consecutive_errors));
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
