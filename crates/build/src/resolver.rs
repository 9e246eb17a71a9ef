// SPDX-License-Identifier: MIT

//! Implicit-execution resolver.
//!
//! Some outputs are cheap renditions of expensive execution state: the
//! completed/code-along html pages reuse the kernel-execution cache that
//! rendering the speaker html populates. The resolver closes a requested
//! tuple set over those provider edges so every cache consumer has its
//! producer scheduled — even when no target asked for the producer.
//!
//! Pure: same table + same requested set ⇒ same implicit set.

use crate::course::{Format, Kind};
use std::collections::{HashMap, HashSet};

/// What running a `(format, kind)` tuple does to the execution cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionRequirement {
    None,
    PopulatesCache,
    ReusesCache,
}

/// Declarative requirement/provider table.
#[derive(Debug, Clone)]
pub struct ExecutionTable {
    entries: HashMap<(Format, Kind), (ExecutionRequirement, Option<(Format, Kind)>)>,
}

impl Default for ExecutionTable {
    /// The built-in table: speaker html populates the cache, the other
    /// html kinds reuse it, everything else is execution-neutral.
    fn default() -> Self {
        let mut entries = HashMap::new();
        let provider = (Format::Html, Kind::Speaker);
        entries.insert(provider, (ExecutionRequirement::PopulatesCache, None));
        entries.insert(
            (Format::Html, Kind::Completed),
            (ExecutionRequirement::ReusesCache, Some(provider)),
        );
        entries.insert(
            (Format::Html, Kind::CodeAlong),
            (ExecutionRequirement::ReusesCache, Some(provider)),
        );
        Self { entries }
    }
}

impl ExecutionTable {
    /// An empty table (nothing populates or reuses anything). Useful as a
    /// fixed fixture in tests.
    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Add or replace one entry.
    pub fn with_entry(
        mut self,
        tuple: (Format, Kind),
        requirement: ExecutionRequirement,
        provider: Option<(Format, Kind)>,
    ) -> Self {
        self.entries.insert(tuple, (requirement, provider));
        self
    }

    pub fn requirement(&self, format: Format, kind: Kind) -> ExecutionRequirement {
        self.entries
            .get(&(format, kind))
            .map(|(requirement, _)| *requirement)
            .unwrap_or(ExecutionRequirement::None)
    }

    pub fn provider(&self, format: Format, kind: Kind) -> Option<(Format, Kind)> {
        self.entries.get(&(format, kind)).and_then(|(_, provider)| *provider)
    }

    /// The implicit tuple set for `requested`: for every requested tuple
    /// that reuses the cache and whose provider tuple (same language) is
    /// not itself requested, the provider is added. Implicit tuples
    /// execute but write no user-visible outputs.
    pub fn resolve_implicit(
        &self,
        requested: &HashSet<(String, Format, Kind)>,
    ) -> HashSet<(String, Format, Kind)> {
        let mut implicit = HashSet::new();
        for (language, format, kind) in requested {
            if self.requirement(*format, *kind) != ExecutionRequirement::ReusesCache {
                continue;
            }
            let Some((provider_format, provider_kind)) = self.provider(*format, *kind) else {
                continue;
            };
            let provider_tuple = (language.clone(), provider_format, provider_kind);
            if !requested.contains(&provider_tuple) {
                implicit.insert(provider_tuple);
            }
        }
        implicit
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
