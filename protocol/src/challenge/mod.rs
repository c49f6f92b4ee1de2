//! # One-Time Challenges
//!
//! The stateful half of authentication. The server hands out a random
//! challenge, the client signs a kind-22242 event carrying it, and the
//! server redeems the challenge exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//! issue ──▶ live ──consume──▶ consumed ──expiry──▶ swept
//!             │                                      ▲
//!             └───────────────expiry─────────────────┘
//! ```
//!
//! A consumed challenge stays in the store until it expires, so a replay
//! within the TTL is reported as [`AuthError::ChallengeConsumed`] rather
//! than [`AuthError::ChallengeUnknown`]. Nothing ever flips `consumed`
//! back to `false`.
//!
//! ## Atomicity
//!
//! [`ChallengeStore::consume`] checks expiry, checks `consumed` and sets it
//! as one step. Of any number of concurrent redeemers of the same
//! challenge, exactly one gets `Ok`.

pub mod store;
pub mod verifier;

pub use store::{MemoryChallengeStore, SledChallengeStore};
pub use verifier::{ChallengeOutcome, ChallengeVerifier};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A server-issued challenge.
///
/// Stored with bincode, so no `skip_serializing_if` here; the JSON shape
/// handed to clients is [`ChallengeIssuance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    /// 64 lowercase hex chars (32 random bytes).
    pub challenge: String,

    /// Unix seconds at issuance.
    pub issued_at: u64,

    /// Unix seconds after which the challenge can no longer be redeemed.
    pub expires_at: u64,

    /// Relay (purpose) the challenge was issued for.
    pub relay: Option<String>,

    pub consumed: bool,
}

impl AuthChallenge {
    /// A challenge is expired from `expires_at` onwards.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Whether the challenge could be redeemed at `now`. A consumed
    /// challenge reports `ChallengeConsumed` even once it has also expired.
    pub fn check_redeemable(&self, now: u64) -> Result<(), AuthError> {
        if self.consumed {
            return Err(AuthError::ChallengeConsumed);
        }
        if self.is_expired(now) {
            return Err(AuthError::ChallengeExpired);
        }
        Ok(())
    }
}

/// The JSON body returned when a challenge is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssuance {
    pub challenge: String,
    /// Issuance time (unix seconds).
    pub timestamp: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
}

impl From<&AuthChallenge> for ChallengeIssuance {
    fn from(c: &AuthChallenge) -> Self {
        Self {
            challenge: c.challenge.clone(),
            timestamp: c.issued_at,
            expires_at: c.expires_at,
            relay: c.relay.clone(),
        }
    }
}

/// Storage for issued challenges.
///
/// Implementations must make [`consume`](ChallengeStore::consume) atomic
/// with respect to every other call on the same store, including calls
/// from other processes sharing the backing storage.
pub trait ChallengeStore: Send + Sync {
    /// Record a freshly issued challenge.
    fn insert(&self, challenge: AuthChallenge) -> Result<(), AuthError>;

    /// Look a challenge up without changing it.
    fn get(&self, challenge: &str) -> Result<Option<AuthChallenge>, AuthError>;

    /// Mark the challenge consumed if it exists, is unconsumed and has not
    /// expired at `now`. Returns the consumed record.
    fn consume(&self, challenge: &str, now: u64) -> Result<AuthChallenge, AuthError>;

    /// Drop every challenge expired at `now`. Returns how many were removed.
    fn sweep_expired(&self, now: u64) -> Result<usize, AuthError>;

    /// Number of stored challenges, consumed or not.
    fn len(&self) -> Result<usize, AuthError>;

    fn is_empty(&self) -> Result<bool, AuthError> {
        Ok(self.len()? == 0)
    }
}
