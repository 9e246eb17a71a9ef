// SPDX-License-Identifier: MIT

//! Worker-side poll loop.
//!
//! Each worker process activates its pre-registered row, then claims jobs,
//! runs its converter, writes the output atomically, populates both cache
//! tiers, and records the outcome — while heartbeating, watching its
//! parent, and honoring cooperative cancellation.

mod cancel;
mod convert;
mod env;
mod error;
mod output;
mod poll;

pub use cancel::CancelProbe;
pub use convert::{CommandConverter, Converter};
pub use env::WorkerEnv;
pub use error::{ConvertError, WorkerError};
pub use output::write_atomic;
pub use poll::{PollConfig, WorkerLoop};
