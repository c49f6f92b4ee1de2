//! Linking a Nostr key to an existing account.
//!
//! ```text
//!            issue_link_challenge           complete_link (verify)
//! Unlinked ─────────────────────▶ ChallengeIssued ──────▶ Verified ──persist──▶ Linked
//!    ▲                                                                          │
//!    └──────────────────────────────── unlink ──────────────────────────────────┘
//! ```
//!
//! `Verified` only exists inside [`IdentityLinker::complete_link`]: the
//! signature checked out and the record is about to be written. The
//! storage layer, not this state machine, is what guarantees that an
//! account and a key are linked at most once.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

use super::db::IdentityDb;
use super::record::{AliasClaim, NostrIdentity};
use crate::challenge::{AuthChallenge, ChallengeVerifier};
use crate::config::{unix_now, CHALLENGE_TAG};
use crate::error::AuthError;
use crate::event::{normalize_public_key, SignedEvent};
use crate::policy::{authorize, AuthContext, AuthPolicy, Principal};

/// Where an account stands in the linking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unlinked,
    ChallengeIssued,
    Verified,
    Linked,
}

#[derive(Debug, Clone)]
struct PendingLink {
    challenge: String,
    expires_at: u64,
}

/// Drives the link / unlink flow for accounts.
#[derive(Debug)]
pub struct IdentityLinker {
    verifier: ChallengeVerifier,
    db: IdentityDb,
    /// Outstanding link challenge per account. Process-local.
    pending: Mutex<HashMap<String, PendingLink>>,
}

pub(crate) fn session_user(ctx: &AuthContext) -> Result<String, AuthError> {
    match authorize(ctx, AuthPolicy::SessionRequired)? {
        Principal::Account { user_id } => Ok(user_id),
        _ => Err(AuthError::Unauthenticated),
    }
}

impl IdentityLinker {
    pub fn new(verifier: ChallengeVerifier, db: IdentityDb) -> Self {
        Self {
            verifier,
            db,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &IdentityDb {
        &self.db
    }

    /// Issue a challenge the signed-in account must sign with the key it
    /// wants to link. Replaces any earlier pending challenge.
    pub fn issue_link_challenge(&self, ctx: &AuthContext) -> Result<AuthChallenge, AuthError> {
        self.issue_link_challenge_at(ctx, unix_now())
    }

    pub fn issue_link_challenge_at(
        &self,
        ctx: &AuthContext,
        now: u64,
    ) -> Result<AuthChallenge, AuthError> {
        let user_id = session_user(ctx)?;
        let challenge = self.verifier.issue_challenge_at(None, now)?;
        self.pending.lock().insert(
            user_id.clone(),
            PendingLink {
                challenge: challenge.challenge.clone(),
                expires_at: challenge.expires_at,
            },
        );
        tracing::info!(%user_id, "link challenge issued");
        Ok(challenge)
    }

    /// Verify the signed challenge and bind its signer to the account.
    pub fn complete_link(
        &self,
        ctx: &AuthContext,
        event: &SignedEvent,
        alias: Option<&AliasClaim>,
    ) -> Result<NostrIdentity, AuthError> {
        self.complete_link_at(ctx, event, alias, unix_now())
    }

    pub fn complete_link_at(
        &self,
        ctx: &AuthContext,
        event: &SignedEvent,
        alias: Option<&AliasClaim>,
        now: u64,
    ) -> Result<NostrIdentity, AuthError> {
        let user_id = session_user(ctx)?;
        let challenge = event
            .first_tag_value(CHALLENGE_TAG)
            .ok_or_else(|| AuthError::Malformed("missing challenge tag".into()))?;

        let pending_matches = self
            .pending
            .lock()
            .get(&user_id)
            .is_some_and(|p| p.challenge == challenge);
        if !pending_matches {
            tracing::warn!(%user_id, "link attempted with a challenge not issued to this account");
            return Err(AuthError::ChallengeUnknown);
        }

        let pubkey = self
            .verifier
            .verify_challenge_response_at(event, now)
            .into_result()?;

        // The challenge is spent either way from here on.
        self.clear_pending(&user_id, challenge);

        let identity = NostrIdentity::new(&user_id, &pubkey, alias);
        if let Err(err) = self.db.create(&identity) {
            tracing::warn!(%user_id, %pubkey, code = err.code(), "link rejected");
            return Err(err);
        }

        tracing::info!(%user_id, %pubkey, "key linked");
        Ok(identity)
    }

    fn clear_pending(&self, user_id: &str, challenge: &str) {
        let mut pending = self.pending.lock();
        if pending.get(user_id).is_some_and(|p| p.challenge == challenge) {
            pending.remove(user_id);
        }
    }

    /// Remove the account's link.
    pub fn unlink(&self, ctx: &AuthContext) -> Result<NostrIdentity, AuthError> {
        let user_id = session_user(ctx)?;
        let removed = self.db.delete(&user_id)?;
        tracing::info!(%user_id, pubkey = %removed.pubkey, "key unlinked");
        Ok(removed)
    }

    /// Identity bound to a key. Accepts either hex case.
    pub fn find_by_pubkey(&self, pubkey: &str) -> Result<Option<NostrIdentity>, AuthError> {
        let Ok(pubkey) = normalize_public_key(pubkey) else {
            return Ok(None);
        };
        self.db.get_by_pubkey(&pubkey)
    }

    pub fn find_by_account(&self, user_id: &str) -> Result<Option<NostrIdentity>, AuthError> {
        self.db.get_by_user(user_id)
    }

    /// The caller's own identity: by account for sessions, by key for
    /// request proofs.
    pub fn find_for_caller(&self, ctx: &AuthContext) -> Result<Option<NostrIdentity>, AuthError> {
        match ctx {
            AuthContext::Session { user_id } => self.find_by_account(user_id),
            AuthContext::Proof { pubkey } => self.find_by_pubkey(pubkey),
            AuthContext::Unauthenticated => Err(AuthError::Unauthenticated),
        }
    }

    pub fn link_state(&self, user_id: &str) -> Result<LinkState, AuthError> {
        self.link_state_at(user_id, unix_now())
    }

    pub fn link_state_at(&self, user_id: &str, now: u64) -> Result<LinkState, AuthError> {
        if self.db.get_by_user(user_id)?.is_some() {
            return Ok(LinkState::Linked);
        }
        let issued = self
            .pending
            .lock()
            .get(user_id)
            .is_some_and(|p| p.expires_at > now);
        Ok(if issued {
            LinkState::ChallengeIssued
        } else {
            LinkState::Unlinked
        })
    }

    /// Stamp `last_auth_at` on the identity bound to `pubkey`.
    pub fn record_authentication(
        &self,
        pubkey: &str,
        at: DateTime<Utc>,
    ) -> Result<NostrIdentity, AuthError> {
        let identity = self
            .find_by_pubkey(pubkey)?
            .ok_or(AuthError::IdentityNotFound)?;
        self.db
            .update(&identity.user_id, |record| record.last_auth_at = Some(at))
    }

    /// Record a fresh alias check for the account's identity.
    pub fn update_alias(
        &self,
        ctx: &AuthContext,
        claim: &AliasClaim,
    ) -> Result<NostrIdentity, AuthError> {
        let user_id = session_user(ctx)?;
        let updated = self.db.update(&user_id, |record| record.apply_alias(claim))?;
        tracing::debug!(%user_id, verified = claim.is_verified(), "alias updated");
        Ok(updated)
    }

    /// Forget pending link challenges that have expired. Returns how many
    /// were dropped.
    pub fn sweep_pending(&self, now: u64) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, p| p.expires_at > now);
        before - pending.len()
    }
}
