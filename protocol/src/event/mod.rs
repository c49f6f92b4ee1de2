//! # Nostr Events
//!
//! Everything the rest of the crate trusts starts here: an event is only as
//! good as its ID and its signature.
//!
//! - **canonical**: NIP-01 serialization and SHA-256 ID derivation.
//! - **keys**: secp256k1 keypairs, x-only public key parsing, `npub`.
//! - **model**: [`SignedEvent`], [`UnsignedEvent`] and the builder.
//! - **verify**: structural, ID and BIP-340 Schnorr checks.
//!
//! Signatures are BIP-340 Schnorr over the 32 raw bytes of the ID, under
//! the author's x-only public key. We use `secp256k1` (libsecp256k1
//! bindings) for both signing and verification.

pub mod canonical;
pub mod keys;
pub mod model;
pub mod verify;

pub use canonical::{canonical_form, sha256_hex};
pub use keys::{decode_npub, encode_npub, normalize_public_key, parse_public_key, KeyError, Keys};
pub use model::{EventBuilder, SignedEvent, Tag, UnsignedEvent};
pub use verify::{verify, verify_id, verify_signature, EventError, VerificationReport};

/// Hex ID of an event, recomputed from its contents.
pub fn compute_id(event: &SignedEvent) -> String {
    event.compute_id()
}

/// Sign an unsigned event. See [`UnsignedEvent::sign`].
pub fn sign(
    unsigned: UnsignedEvent,
    keys: &Keys,
) -> Result<SignedEvent, crate::error::AuthError> {
    unsigned.sign(keys)
}
