// SPDX-License-Identifier: MIT

//! Error taxonomy.
//!
//! Every error the core surfaces falls into one of five classes, which
//! decide the propagation policy: user errors are counted and the build
//! continues; configuration errors are fatal at startup; infrastructure
//! errors may trigger restart or abort; transient errors are retried with
//! backoff; cancellation is never treated as failure.

use serde::{Deserialize, Serialize};

/// The five-way classification used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad input artifact; the converter rejected the source.
    User,
    /// Missing tool, invalid course spec, unknown target filter.
    Configuration,
    /// Worker crash, store unreachable, executor failure.
    Infrastructure,
    /// Store busy, worker still activating. Retried with backoff.
    Transient,
    /// Job was cancelled. Never a failure.
    Cancelled,
}

impl ErrorClass {
    /// Whether the class is retried instead of surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    /// Whether the class aborts a build when raised at startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, ErrorClass::Configuration | ErrorClass::Infrastructure)
    }
}

crate::text_enum! {
    ErrorClass {
        User => "user",
        Configuration => "configuration",
        Infrastructure => "infrastructure",
        Transient => "transient",
        Cancelled => "cancelled",
    }
}

/// Implemented by every crate-level error enum so the build layer can apply
/// one propagation policy to all of them.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}
