//! Interfaces to the parts of the platform this crate doesn't own.
//!
//! Accounts, session tokens and alias lookups live elsewhere. The flows in
//! [`crate::flow`] talk to them through these traits, shared as
//! `Arc<dyn …>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::identity::AliasVerification;

/// The slice of an account the auth flows need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Tokens handed to a client after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access: String,
    pub refresh: String,
    /// Lifetime of `access`, in seconds.
    pub expires_in: u64,
}

/// Account storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The account whose linked identity has this public key.
    async fn find_by_pubkey_linkage(&self, pubkey: &str) -> Result<Option<Account>, AuthError>;

    async fn find_by_id(&self, user_id: &str) -> Result<Option<Account>, AuthError>;
}

/// Checks a human-readable alias against a key (NIP-05 lookups and the like).
#[async_trait]
pub trait AliasVerifier: Send + Sync {
    async fn verify(&self, alias: &str, pubkey: &str) -> AliasVerification;
}

/// The platform's own bearer sessions.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue_tokens(&self, account: &Account) -> Result<SessionTokens, AuthError>;

    /// The account an access token belongs to, if it is valid.
    async fn verify_access_token(&self, token: &str) -> Option<String>;
}
