//! NIP-01 canonical serialization and event ID derivation.
//!
//! The ID of an event is the SHA-256 of the compact JSON array
//!
//! ```text
//! [0,<pubkey>,<created_at>,<kind>,<tags>,<content>]
//! ```
//!
//! Integers are written without a fractional part, strings use the minimal
//! JSON escapes (`\n`, `\"`, `\\`, `\r`, `\t`, `\b`, `\f`, `\u00XX` for the
//! remaining C0 controls) and every other character is emitted verbatim as
//! UTF-8. `serde_json`'s compact writer produces exactly this, so the array
//! is serialized as a tuple rather than assembled by hand.

use sha2::{Digest, Sha256};

/// Canonical form of the signed fields of an event.
pub fn canonical_form(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    serde_json::to_string(&(0u8, pubkey, created_at, kind, tags, content))
        .expect("a tuple of strings and integers always serializes")
}

/// SHA-256 of the canonical form.
pub fn event_digest(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical_form(pubkey, created_at, kind, tags, content).as_bytes());
    hasher.finalize().into()
}

/// Lowercase hex SHA-256 of arbitrary bytes. Used for NIP-98 payload tags.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
