//! The persisted identity record and the alias values attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::did::did_for_pubkey;

/// Result of checking a human-readable alias (NIP-05 style) against a key.
///
/// Produced by an [`crate::collab::AliasVerifier`]; this crate never does
/// the network lookup itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasVerification {
    pub verified: bool,
    pub checked_at: DateTime<Utc>,
}

/// An alias together with the outcome of its latest check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasClaim {
    pub alias: String,
    pub verification: AliasVerification,
}

impl AliasClaim {
    pub fn new(alias: impl Into<String>, verification: AliasVerification) -> Self {
        Self {
            alias: alias.into(),
            verification,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification.verified
    }
}

/// A key bound to an account.
///
/// One per account and one per key; [`super::IdentityDb`] enforces both.
/// Stored with bincode, so every field is always serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NostrIdentity {
    pub identity_id: Uuid,
    pub user_id: String,
    /// Lowercase hex x-only public key.
    pub pubkey: String,
    /// `did:nostr:<pubkey>`, derived from `pubkey`.
    pub did: String,
    pub alias: Option<String>,
    pub alias_verified: bool,
    pub alias_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_auth_at: Option<DateTime<Utc>>,
}

impl NostrIdentity {
    /// A new record for `user_id` and an already-normalized `pubkey`.
    pub fn new(user_id: &str, pubkey: &str, alias: Option<&AliasClaim>) -> Self {
        let mut identity = Self {
            identity_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            pubkey: pubkey.to_string(),
            did: did_for_pubkey(pubkey),
            alias: None,
            alias_verified: false,
            alias_checked_at: None,
            created_at: Utc::now(),
            last_auth_at: None,
        };
        if let Some(claim) = alias {
            identity.apply_alias(claim);
        }
        identity
    }

    pub fn apply_alias(&mut self, claim: &AliasClaim) {
        self.alias = Some(claim.alias.clone());
        self.alias_verified = claim.verification.verified;
        self.alias_checked_at = Some(claim.verification.checked_at);
    }

    /// The stored alias as a claim, if there is one and it was checked.
    pub fn alias_claim(&self) -> Option<AliasClaim> {
        let alias = self.alias.clone()?;
        let checked_at = self.alias_checked_at?;
        Some(AliasClaim {
            alias,
            verification: AliasVerification {
                verified: self.alias_verified,
                checked_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(verified: bool) -> AliasClaim {
        AliasClaim::new(
            "alice@example.com",
            AliasVerification {
                verified,
                checked_at: Utc::now(),
            },
        )
    }

    #[test]
    fn new_identity_derives_did() {
        let pk = "ab".repeat(32);
        let id = NostrIdentity::new("u1", &pk, None);
        assert_eq!(id.did, format!("did:nostr:{}", pk));
        assert!(id.alias.is_none());
        assert!(!id.alias_verified);
        assert!(id.last_auth_at.is_none());
    }

    #[test]
    fn alias_claim_roundtrip() {
        let c = claim(true);
        let id = NostrIdentity::new("u1", &"ab".repeat(32), Some(&c));
        assert_eq!(id.alias.as_deref(), Some("alice@example.com"));
        assert!(id.alias_verified);
        assert_eq!(id.alias_claim(), Some(c));
    }

    #[test]
    fn unverified_alias_is_kept_but_flagged() {
        let id = NostrIdentity::new("u1", &"ab".repeat(32), Some(&claim(false)));
        assert_eq!(id.alias.as_deref(), Some("alice@example.com"));
        assert!(!id.alias_verified);
    }

    #[test]
    fn identity_ids_are_unique() {
        let a = NostrIdentity::new("u1", &"ab".repeat(32), None);
        let b = NostrIdentity::new("u1", &"ab".repeat(32), None);
        assert_ne!(a.identity_id, b.identity_id);
    }

    #[test]
    fn bincode_roundtrip() {
        let id = NostrIdentity::new("u1", &"ab".repeat(32), Some(&claim(true)));
        let bytes = bincode::serialize(&id).unwrap();
        let back: NostrIdentity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, back);
    }
}
