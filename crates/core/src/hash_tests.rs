// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn same_input_same_hash() {
    let a = content_hash(b"source text", "lang=en;fmt=notebook;");
    let b = content_hash(b"source text", "lang=en;fmt=notebook;");
    assert_eq!(a, b);
}

#[test]
fn input_change_changes_hash() {
    let a = content_hash(b"source text", "lang=en;");
    let b = content_hash(b"source text!", "lang=en;");
    assert_ne!(a, b);
}

#[test]
fn metadata_change_changes_hash() {
    let a = content_hash(b"source text", "lang=en;");
    let b = content_hash(b"source text", "lang=de;");
    assert_ne!(a, b);
}

#[test]
fn separator_prevents_boundary_collisions() {
    // bytes "ab" + meta "c" must differ from bytes "a" + meta "bc"
    let a = content_hash(b"ab", "c");
    let b = content_hash(b"a", "bc");
    assert_ne!(a, b);
}

#[test]
fn fingerprint_is_order_sensitive_input_canonicalized_by_caller() {
    let a = metadata_fingerprint([("fmt", "notebook"), ("lang", "en")]);
    let b = metadata_fingerprint([("fmt", "notebook"), ("lang", "en")]);
    assert_eq!(a, b);
    let c = metadata_fingerprint([("lang", "en"), ("fmt", "notebook")]);
    assert_ne!(a, c, "caller is responsible for sorted iteration");
}

#[test]
fn hash_is_hex_sha256() {
    let h = content_hash(b"", "");
    assert_eq!(h.len(), 64);
    assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
}
