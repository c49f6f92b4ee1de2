//! Error taxonomy for the authentication core.
//!
//! Every verification boundary reports failures as an [`AuthError`]. The
//! variants are deliberately distinct (an expired challenge is not an
//! unknown one) so the HTTP layer can map each to a stable code via
//! [`AuthError::code`].

use thiserror::Error;

/// Errors that can occur while authenticating or linking a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The event, header or request body is structurally invalid.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// The event ID or its Schnorr signature does not verify.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// The challenge was never issued (or has already been swept).
    #[error("unknown challenge")]
    ChallengeUnknown,

    /// The challenge exists but its lifetime has elapsed.
    #[error("challenge expired")]
    ChallengeExpired,

    /// The challenge was already redeemed once.
    #[error("challenge already consumed")]
    ChallengeConsumed,

    /// The challenge response names a different relay than the one the
    /// challenge was issued for.
    #[error("relay mismatch: expected {expected}, got {got}")]
    RelayMismatch {
        /// Relay recorded at issuance.
        expected: String,
        /// Relay declared in the event (empty if absent).
        got: String,
    },

    /// A stateless proof is too old or too far in the future.
    #[error("timestamp {created_at} outside window of {window_secs}s around {now}")]
    TimestampOutOfWindow {
        /// `created_at` declared by the event.
        created_at: u64,
        /// Server time used for the check.
        now: u64,
        /// Allowed distance in seconds.
        window_secs: u64,
    },

    /// A stateless proof was signed for a different URL or method.
    #[error("request mismatch: {0}")]
    RequestMismatch(String),

    /// A stateless proof's `payload` tag does not hash the request body.
    #[error("payload hash mismatch")]
    PayloadMismatch,

    /// A stateless proof was already presented within its window.
    #[error("proof already used")]
    ProofReplayed,

    /// The declared public key differs from the one that signed.
    #[error("public key mismatch: declared {declared}, signed by {signer}")]
    PubkeyMismatch {
        /// Public key the caller claimed.
        declared: String,
        /// Public key that actually signed.
        signer: String,
    },

    /// The account or the public key is already bound to an identity.
    #[error("already linked: {0}")]
    AlreadyLinked(String),

    /// No identity is bound to the given key or account.
    #[error("identity not found")]
    IdentityNotFound,

    /// A DID string failed syntax validation.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// The request needs an authenticated caller and none was presented.
    #[error("authentication required")]
    Unauthenticated,

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Stable machine-readable code for this error.
    ///
    /// These strings are part of the HTTP contract. Add new ones freely,
    /// never rename existing ones.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Malformed(_) => "malformed",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::ChallengeUnknown => "challenge_unknown",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::ChallengeConsumed => "challenge_consumed",
            AuthError::RelayMismatch { .. } => "relay_mismatch",
            AuthError::TimestampOutOfWindow { .. } => "timestamp_out_of_window",
            AuthError::RequestMismatch(_) => "request_mismatch",
            AuthError::PayloadMismatch => "payload_mismatch",
            AuthError::ProofReplayed => "proof_replayed",
            AuthError::PubkeyMismatch { .. } => "pubkey_mismatch",
            AuthError::AlreadyLinked(_) => "already_linked",
            AuthError::IdentityNotFound => "identity_not_found",
            AuthError::InvalidDid(_) => "invalid_did",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Storage(_) => "storage_error",
        }
    }
}
