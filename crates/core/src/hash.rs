// SPDX-License-Identifier: MIT

//! Content hashing for cache keys.
//!
//! A job's `content_hash` covers the input bytes plus the
//! semantically-significant parts of the output spec, so that changing
//! either the source or the requested rendition invalidates the cache.

use sha2::{Digest, Sha256};

/// Hash input bytes together with the output-metadata fingerprint.
pub fn content_hash(input_bytes: &[u8], output_metadata: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input_bytes);
    hasher.update([0u8]);
    hasher.update(output_metadata.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical fingerprint of output metadata.
///
/// Key-value pairs are sorted by the caller (BTreeMap iteration order) and
/// joined with unambiguous separators so that semantically-equal metadata
/// always fingerprints identically.
pub fn metadata_fingerprint<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let canonical: String =
        pairs.into_iter().map(|(k, v)| format!("{}={};", k, v)).collect();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
