// SPDX-License-Identifier: MIT

//! Driver termination discipline.
//!
//! The first termination signal requests a graceful stop: nothing but an
//! atomic flag flips inside the handler, and cancellation travels through
//! the task scheduler via the token. The second signal exits immediately.
//! After a successful build the signals become no-ops so a late Ctrl-C
//! during teardown cannot smear the success summary.

use crate::report::BuildReporter;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a received signal should do, given how many came before and
/// whether the build already finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    CancelBuild,
    HardExit,
    Ignore,
}

/// Pure signal-counting state machine (separable from the actual signal
/// streams so the discipline is testable).
#[derive(Debug, Default)]
pub struct SignalState {
    received: AtomicU32,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_signal(&self, build_finished: bool) -> SignalAction {
        if build_finished {
            return SignalAction::Ignore;
        }
        match self.received.fetch_add(1, Ordering::SeqCst) {
            0 => SignalAction::CancelBuild,
            _ => SignalAction::HardExit,
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.received.load(Ordering::SeqCst) > 0
    }
}

pub struct ShutdownCoordinator {
    token: CancellationToken,
    state: Arc<SignalState>,
    reporter: Arc<BuildReporter>,
}

impl ShutdownCoordinator {
    /// Install signal handling. Must run before the build loops are
    /// entered so no window exists where a signal kills the process
    /// uncleanly.
    pub fn install(reporter: Arc<BuildReporter>) -> Self {
        let token = CancellationToken::new();
        let state = Arc::new(SignalState::new());
        spawn_signal_task(token.clone(), Arc::clone(&state), Arc::clone(&reporter));
        Self { token, state, reporter }
    }

    /// The cancellation token build loops select on.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.state.shutdown_requested()
    }

    /// Mark the build finished: late signals become no-ops and late
    /// worker errors are suppressed by the reporter.
    pub fn finish(&self) {
        self.reporter.finish();
    }
}

#[cfg(unix)]
fn spawn_signal_task(
    token: CancellationToken,
    state: Arc<SignalState>,
    reporter: Arc<BuildReporter>,
) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGINT handler");
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            match state.on_signal(reporter.is_finished()) {
                SignalAction::CancelBuild => {
                    // Only the flag flips here; everything else reacts to
                    // the token from a safe suspension point.
                    token.cancel();
                }
                SignalAction::HardExit => std::process::exit(130),
                SignalAction::Ignore => {}
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_task(
    token: CancellationToken,
    state: Arc<SignalState>,
    reporter: Arc<BuildReporter>,
) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            match state.on_signal(reporter.is_finished()) {
                SignalAction::CancelBuild => token.cancel(),
                SignalAction::HardExit => std::process::exit(130),
                SignalAction::Ignore => {}
            }
        }
    });
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
