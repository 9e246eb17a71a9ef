// SPDX-License-Identifier: MIT

//! SQLite-backed coordination store.
//!
//! One embedded database is the only synchronization primitive between the
//! build driver and its worker processes: a durable job queue with atomic
//! claims, a worker registry with heartbeats, a two-tier result cache, and
//! an append-only lifecycle event log.
//!
//! Connection discipline: connections are short-lived, created per call via
//! [`Store::connect`], and never cross threads. All read-modify-write goes
//! through a transaction; claims use an immediate-mode write transaction so
//! concurrent workers cannot select the same row.

mod cache;
mod error;
mod events;
mod queue;
mod registry;
mod store;

pub use cache::{Envelope, ResultStore};
pub use error::{with_busy_retry, StoreError};
pub use events::{LoggedEvent, NewEvent};
pub use queue::{JobCounts, JobQueue};
pub use registry::{CleanupReport, StaleConfig};
pub use store::Store;
