// SPDX-License-Identifier: MIT

//! Session policy over the pool manager: reuse existing workers, start
//! missing ones, and stop only what this session owns.

use crate::error::PoolError;
use crate::manager::{PoolManager, PoolSpec, StartReport};
use lectern_core::Clock;

/// How this driver session relates to the worker population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Start workers on entry, stop them on exit.
    Managed,
    /// Reuse workers left running by a prior session; never start or stop.
    Persistent,
    /// Reuse healthy workers where enough exist, start the deficit,
    /// stop only what was started here.
    Mixed,
}

pub struct LifecycleManager<C: Clock> {
    manager: std::sync::Arc<PoolManager<C>>,
    mode: SessionMode,
}

impl<C: Clock> LifecycleManager<C> {
    pub fn new(manager: PoolManager<C>, mode: SessionMode) -> Self {
        Self { manager: std::sync::Arc::new(manager), mode }
    }

    /// Shared handle to the pool manager (the monitor task holds one).
    pub fn manager(&self) -> std::sync::Arc<PoolManager<C>> {
        std::sync::Arc::clone(&self.manager)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Per-pool worker deficit under the current mode.
    ///
    /// Managed sessions always start the full count. Reusing modes count
    /// healthy rows with fresh heartbeats and only start the difference —
    /// a pool that is already staffed spawns nothing.
    pub fn deficits(&self) -> Result<Vec<(PoolSpec, usize)>, PoolError> {
        let config = self.manager.config();
        let grace_ms = config.heartbeat_grace.as_millis() as u64;
        let mut out = Vec::new();
        for pool in &config.pools {
            let deficit = match self.mode {
                SessionMode::Managed => pool.count,
                SessionMode::Persistent => 0,
                SessionMode::Mixed => {
                    let healthy = self
                        .manager
                        .queue()
                        .healthy_worker_count(&pool.worker_type, grace_ms)?;
                    pool.count.saturating_sub(healthy)
                }
            };
            out.push((pool.clone(), deficit));
        }
        Ok(out)
    }

    /// Whether `start_managed` would start anything at all.
    pub fn should_start_workers(&self) -> Result<bool, PoolError> {
        Ok(self.deficits()?.iter().any(|(_, n)| *n > 0))
    }

    /// Start the per-pool deficits (no-op under `Persistent`).
    pub async fn start_managed(&self) -> Result<StartReport, PoolError> {
        let deficits: Vec<(PoolSpec, usize)> =
            self.deficits()?.into_iter().filter(|(_, n)| *n > 0).collect();
        if deficits.is_empty() {
            tracing::info!(mode = ?self.mode, "all pools staffed, starting no workers");
            return Ok(StartReport::default());
        }
        for (pool, n) in &deficits {
            tracing::info!(
                worker_type = %pool.worker_type,
                count = n,
                mode = ?self.mode,
                "starting workers"
            );
        }
        self.manager.start_counts(deficits).await
    }

    /// Stop workers this session started. Persistent sessions leave the
    /// population untouched.
    pub async fn stop_managed(&self) -> Result<(), PoolError> {
        match self.mode {
            SessionMode::Persistent => {
                tracing::info!("persistent session, leaving workers running");
                Ok(())
            }
            SessionMode::Managed | SessionMode::Mixed => self.manager.stop_session().await,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
