// SPDX-License-Identifier: MIT

//! Two-tier result cache.
//!
//! Tier 2 (`result_cache`, in the main store) records that an output file
//! was produced for a given content hash — a hit means "the bytes on disk
//! are current". Tier 1 (`stored_results`, its own store file) keeps the
//! full artifact bytes so an unchanged input can be materialized without
//! dispatching any worker at all.
//!
//! Stored bytes are wrapped in a versioned tagged envelope and compressed,
//! so tier-1 hits survive runtime upgrades and stay readable across
//! serializer changes.

use crate::error::StoreError;
use crate::queue::{path_str, JobQueue};
use crate::store::{migrate, Store};
use lectern_core::Clock;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

impl<C: Clock> JobQueue<C> {
    /// Tier-2 lookup. A hit touches `last_accessed` and bumps
    /// `access_count`, then returns the stored metadata.
    pub fn check_cache(
        &self,
        output_file: &Path,
        content_hash: &str,
    ) -> Result<Option<String>, StoreError> {
        let now = self.clock.epoch_ms();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let metadata: Option<Option<String>> = tx
            .query_row(
                "SELECT result_metadata FROM result_cache
                 WHERE output_file = ?1 AND content_hash = ?2",
                params![path_str(output_file), content_hash],
                |row| row.get(0),
            )
            .optional()?;
        let Some(metadata) = metadata else {
            tx.commit()?;
            return Ok(None);
        };
        tx.execute(
            "UPDATE result_cache SET last_accessed = ?1, access_count = access_count + 1
             WHERE output_file = ?2 AND content_hash = ?3",
            params![now, path_str(output_file), content_hash],
        )?;
        tx.commit()?;
        Ok(Some(metadata.unwrap_or_default()))
    }

    /// Tier-2 upsert, written on successful completion.
    pub fn put_cache(
        &self,
        output_file: &Path,
        content_hash: &str,
        metadata: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO result_cache
                 (output_file, content_hash, result_metadata, created_at, last_accessed, access_count)
             VALUES (?1, ?2, ?3, ?4, ?4, 1)
             ON CONFLICT(output_file, content_hash) DO UPDATE SET
                 result_metadata = excluded.result_metadata,
                 last_accessed = excluded.last_accessed",
            params![path_str(output_file), content_hash, metadata, now],
        )?;
        Ok(())
    }
}

/// Versioned envelope for tier-1 artifact bytes.
///
/// Layout: `version u16 | kind_len u16 | kind | meta_len u32 | metadata |
/// zstd(payload)` — all integers big-endian. Bump `ENVELOPE_VERSION` when
/// the layout changes; decode refuses unknown versions instead of guessing.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: String,
    pub metadata: serde_json::Value,
    pub payload: Vec<u8>,
}

const ENVELOPE_VERSION: u16 = 1;
const ZSTD_LEVEL: i32 = 3;

impl Envelope {
    pub fn new(kind: impl Into<String>, metadata: serde_json::Value, payload: Vec<u8>) -> Self {
        Self { kind: kind.into(), metadata, payload }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let kind = self.kind.as_bytes();
        let metadata = serde_json::to_vec(&self.metadata)?;
        let compressed = zstd::encode_all(&self.payload[..], ZSTD_LEVEL)?;
        let mut out =
            Vec::with_capacity(2 + 2 + kind.len() + 4 + metadata.len() + compressed.len());
        out.extend_from_slice(&ENVELOPE_VERSION.to_be_bytes());
        out.extend_from_slice(&(kind.len() as u16).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(&(metadata.len() as u32).to_be_bytes());
        out.extend_from_slice(&metadata);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let take = |bytes: &[u8], at: usize, n: usize| -> Result<Vec<u8>, StoreError> {
            bytes
                .get(at..at + n)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| StoreError::Corrupt("truncated result envelope".to_string()))
        };
        let version = u16::from_be_bytes(
            take(bytes, 0, 2)?
                .try_into()
                .map_err(|_| StoreError::Corrupt("truncated result envelope".to_string()))?,
        );
        if version != ENVELOPE_VERSION {
            return Err(StoreError::EnvelopeVersion(version));
        }
        let kind_len = u16::from_be_bytes(
            take(bytes, 2, 2)?
                .try_into()
                .map_err(|_| StoreError::Corrupt("truncated result envelope".to_string()))?,
        ) as usize;
        let kind = String::from_utf8(take(bytes, 4, kind_len)?)
            .map_err(|_| StoreError::Corrupt("envelope kind is not utf-8".to_string()))?;
        let meta_at = 4 + kind_len;
        let meta_len = u32::from_be_bytes(
            take(bytes, meta_at, 4)?
                .try_into()
                .map_err(|_| StoreError::Corrupt("truncated result envelope".to_string()))?,
        ) as usize;
        let metadata = serde_json::from_slice(&take(bytes, meta_at + 4, meta_len)?)?;
        let compressed = bytes
            .get(meta_at + 4 + meta_len..)
            .ok_or_else(|| StoreError::Corrupt("truncated result envelope".to_string()))?;
        let payload = zstd::decode_all(compressed)?;
        Ok(Self { kind, metadata, payload })
    }
}

const CACHE_MIGRATIONS: &[&str] = &[
    // v1: initial schema
    "
    CREATE TABLE IF NOT EXISTS stored_results (
        input_file TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        output_fingerprint TEXT NOT NULL,
        envelope BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (input_file, content_hash, output_fingerprint)
    );
    ",
];

/// Tier-1 stored-result store, usually a separate `cache.db` so it can be
/// destroyed independently of the queue.
#[derive(Clone)]
pub struct ResultStore<C: Clock> {
    store: Store,
    clock: C,
}

impl<C: Clock> ResultStore<C> {
    /// Open (creating if necessary) and migrate the cache store at `path`.
    pub fn open(path: impl AsRef<Path>, clock: C) -> Result<Self, StoreError> {
        let store = Store::open_with_migrations(path, CACHE_MIGRATIONS)?;
        Ok(Self { store, clock })
    }

    /// Look up stored bytes by input, hash, and output fingerprint.
    pub fn get(
        &self,
        input_file: &Path,
        content_hash: &str,
        output_fingerprint: &str,
    ) -> Result<Option<Envelope>, StoreError> {
        let conn = self.store.connect()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT envelope FROM stored_results
                 WHERE input_file = ?1 AND content_hash = ?2 AND output_fingerprint = ?3",
                params![path_str(input_file), content_hash, output_fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        blob.map(|b| Envelope::decode(&b)).transpose()
    }

    /// Store (or replace) artifact bytes under the composite key.
    pub fn put(
        &self,
        input_file: &Path,
        content_hash: &str,
        output_fingerprint: &str,
        envelope: &Envelope,
    ) -> Result<(), StoreError> {
        let conn = self.store.connect()?;
        conn.execute(
            "INSERT INTO stored_results
                 (input_file, content_hash, output_fingerprint, envelope, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(input_file, content_hash, output_fingerprint) DO UPDATE SET
                 envelope = excluded.envelope,
                 created_at = excluded.created_at",
            params![
                path_str(input_file),
                content_hash,
                output_fingerprint,
                envelope.encode()?,
                self.clock.epoch_ms(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
