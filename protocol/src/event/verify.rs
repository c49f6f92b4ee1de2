//! Event verification.
//!
//! [`verify`] runs the full pipeline and reports *why* an event failed:
//!
//! 1. Structure: `id`, `pubkey` and `sig` must be lowercase hex of the
//!    right length, the key must be on the curve, and no tag may be empty.
//!    Any failure here skips the cryptographic checks entirely.
//! 2. ID recomputation from the canonical form.
//! 3. Schnorr signature over the *declared* ID.
//!
//! Steps 2 and 3 are independent so a tampered field (ID mismatch) and a
//! forged signature are reported separately.

use secp256k1::{schnorr::Signature, Message, Secp256k1};
use serde::Serialize;
use thiserror::Error;

use super::keys::parse_public_key;
use super::model::SignedEvent;
use crate::config::{HEX_KEY_LENGTH, HEX_SIGNATURE_LENGTH};
use crate::error::AuthError;

/// One reason an event failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EventError {
    /// A field has the wrong shape. Carries the field name.
    #[error("malformed field: {0}")]
    Malformed(&'static str),

    /// The declared ID is not the hash of the event.
    #[error("event id does not match its contents")]
    IdMismatch,

    /// The signature does not verify under the declared public key.
    #[error("bad signature")]
    BadSignature,
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub errors: Vec<EventError>,
}

impl VerificationReport {
    /// Collapse the report into the crate error type. Structural errors win
    /// over cryptographic ones.
    pub fn into_result(self) -> Result<(), AuthError> {
        if self.valid {
            return Ok(());
        }
        if let Some(EventError::Malformed(field)) = self
            .errors
            .iter()
            .find(|e| matches!(e, EventError::Malformed(_)))
        {
            return Err(AuthError::Malformed(format!("event {}", field)));
        }
        let reason = self
            .errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(AuthError::SignatureInvalid(reason))
    }
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn structural_errors(event: &SignedEvent) -> Vec<EventError> {
    let mut errors = Vec::new();
    if !is_lower_hex(&event.id, HEX_KEY_LENGTH) {
        errors.push(EventError::Malformed("id"));
    }
    if !is_lower_hex(&event.pubkey, HEX_KEY_LENGTH) || parse_public_key(&event.pubkey).is_err() {
        errors.push(EventError::Malformed("pubkey"));
    }
    if !is_lower_hex(&event.sig, HEX_SIGNATURE_LENGTH) {
        errors.push(EventError::Malformed("sig"));
    }
    if event.tags.iter().any(Vec::is_empty) {
        errors.push(EventError::Malformed("tags"));
    }
    errors
}

/// `true` if `id` is the hash of the event's canonical form.
pub fn verify_id(event: &SignedEvent) -> bool {
    event.compute_id() == event.id
}

/// `true` if `sig` is a valid Schnorr signature over the declared `id`.
///
/// Does not check that `id` matches the contents; see [`verify_id`].
/// Unparseable inputs verify as `false`.
pub fn verify_signature(event: &SignedEvent) -> bool {
    let Ok(pk) = parse_public_key(&event.pubkey) else {
        return false;
    };
    let Ok(id) = hex::decode(&event.id) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(&event.sig) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    let Ok(msg) = Message::from_digest_slice(&id) else {
        return false;
    };
    Secp256k1::verification_only()
        .verify_schnorr(&sig, &msg, &pk)
        .is_ok()
}

/// Full verification. See the module docs for the order of checks.
pub fn verify(event: &SignedEvent) -> VerificationReport {
    let mut errors = structural_errors(event);
    if errors.is_empty() {
        if !verify_id(event) {
            errors.push(EventError::IdMismatch);
        }
        if !verify_signature(event) {
            errors.push(EventError::BadSignature);
        }
    }

    if !errors.is_empty() {
        tracing::debug!(id = %event.id, ?errors, "event failed verification");
    }

    VerificationReport {
        valid: errors.is_empty(),
        errors,
    }
}
