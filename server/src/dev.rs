//! Development stand-ins for the platform collaborators.
//!
//! The real account database, session service and NIP-05 lookups live
//! outside this service. These let the binary run on its own: an account
//! exists once it has a linked key or a live session, sessions are random
//! tokens held in memory, and aliases are never confirmed.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;

use nostr_auth::collab::{Account, AccountStore, AliasVerifier, SessionIssuer, SessionTokens};
use nostr_auth::config::unix_now;
use nostr_auth::identity::{AliasVerification, IdentityLinker};
use nostr_auth::AuthError;

/// Access token lifetime, in seconds.
pub const ACCESS_TOKEN_TTL: u64 = 900;

/// Accounts known through a linked key or a live session.
pub struct LinkedAccounts {
    linker: Arc<IdentityLinker>,
    sessions: Arc<MemorySessions>,
}

impl LinkedAccounts {
    pub fn new(linker: Arc<IdentityLinker>, sessions: Arc<MemorySessions>) -> Self {
        Self { linker, sessions }
    }
}

#[async_trait]
impl AccountStore for LinkedAccounts {
    async fn find_by_pubkey_linkage(&self, pubkey: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.linker.find_by_pubkey(pubkey)?.map(|identity| Account {
            user_id: identity.user_id,
            display_name: identity.alias.filter(|_| identity.alias_verified),
        }))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<Account>, AuthError> {
        let known = self.linker.find_by_account(user_id)?.is_some()
            || self.sessions.has_live_session(user_id, unix_now());
        Ok(known.then(|| Account {
            user_id: user_id.to_string(),
            display_name: None,
        }))
    }
}

struct Session {
    user_id: String,
    expires_at: u64,
}

/// Bearer sessions held in process memory. Lost on restart.
#[derive(Default)]
pub struct MemorySessions {
    sessions: DashMap<String, Session>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue tokens for an account ID without any login.
    pub fn issue_for(&self, user_id: &str) -> SessionTokens {
        let access = random_token();
        self.sessions.insert(
            access.clone(),
            Session {
                user_id: user_id.to_string(),
                expires_at: unix_now() + ACCESS_TOKEN_TTL,
            },
        );
        SessionTokens {
            access,
            refresh: random_token(),
            expires_in: ACCESS_TOKEN_TTL,
        }
    }

    /// `true` if `user_id` holds at least one unexpired session.
    pub fn has_live_session(&self, user_id: &str, now: u64) -> bool {
        self.sessions
            .iter()
            .any(|s| s.user_id == user_id && s.expires_at > now)
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn sweep_expired(&self, now: u64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        before - self.sessions.len()
    }
}

#[async_trait]
impl SessionIssuer for MemorySessions {
    async fn issue_tokens(&self, account: &Account) -> Result<SessionTokens, AuthError> {
        Ok(self.issue_for(&account.user_id))
    }

    async fn verify_access_token(&self, token: &str) -> Option<String> {
        let session = self.sessions.get(token)?;
        (session.expires_at > unix_now()).then(|| session.user_id.clone())
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Never confirms an alias.
pub struct UnverifiedAliases;

#[async_trait]
impl AliasVerifier for UnverifiedAliases {
    async fn verify(&self, alias: &str, _pubkey: &str) -> AliasVerification {
        tracing::debug!(%alias, "alias verification not configured; recording as unverified");
        AliasVerification {
            verified: false,
            checked_at: Utc::now(),
        }
    }
}
