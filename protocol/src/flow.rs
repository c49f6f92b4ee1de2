//! Login, link and per-request authentication, end to end.
//!
//! [`Authenticator`] glues the verifiers and the linker to the platform
//! collaborators. The HTTP layer only parses requests and maps errors; all
//! decisions are made here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::challenge::{AuthChallenge, ChallengeVerifier};
use crate::collab::{AccountStore, AliasVerifier, SessionIssuer, SessionTokens};
use crate::error::AuthError;
use crate::event::{normalize_public_key, SignedEvent};
use crate::identity::linker::session_user;
use crate::identity::{AliasClaim, IdentityLinker, NostrIdentity};
use crate::policy::AuthContext;
use crate::proof::{parse_proof_header, ProofVerifier};

/// Body of a login request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Key the client claims to log in with. Must be the event's signer.
    pub pubkey: String,
    pub signed_event: SignedEvent,
    /// Alias to (re-)verify for the identity on this login.
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: String,
    pub pubkey: String,
    #[serde(flatten)]
    pub tokens: SessionTokens,
}

/// Body of a link request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub signed_event: SignedEvent,
    #[serde(default)]
    pub alias: Option<String>,
}

/// The authentication service.
pub struct Authenticator {
    verifier: ChallengeVerifier,
    linker: Arc<IdentityLinker>,
    proofs: ProofVerifier,
    accounts: Arc<dyn AccountStore>,
    aliases: Arc<dyn AliasVerifier>,
    sessions: Arc<dyn SessionIssuer>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("verifier", &self.verifier)
            .field("proofs", &self.proofs)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(
        verifier: ChallengeVerifier,
        linker: Arc<IdentityLinker>,
        proofs: ProofVerifier,
        accounts: Arc<dyn AccountStore>,
        aliases: Arc<dyn AliasVerifier>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            verifier,
            linker,
            proofs,
            accounts,
            aliases,
            sessions,
        }
    }

    pub fn verifier(&self) -> &ChallengeVerifier {
        &self.verifier
    }

    pub fn linker(&self) -> &Arc<IdentityLinker> {
        &self.linker
    }

    pub fn proofs(&self) -> &ProofVerifier {
        &self.proofs
    }

    pub fn issue_login_challenge(&self, relay: Option<&str>) -> Result<AuthChallenge, AuthError> {
        self.verifier.issue_challenge(relay)
    }

    /// Log in with a signed challenge.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let declared = normalize_public_key(&request.pubkey)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let signer = request.signed_event.pubkey.to_lowercase();
        if declared != signer {
            return Err(AuthError::PubkeyMismatch { declared, signer });
        }

        let pubkey = self
            .verifier
            .verify_challenge_response(&request.signed_event)
            .into_result()?;

        let account = self
            .accounts
            .find_by_pubkey_linkage(&pubkey)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        let tokens = self.sessions.issue_tokens(&account).await?;

        if let Err(err) = self.linker.record_authentication(&pubkey, Utc::now()) {
            tracing::warn!(%pubkey, code = err.code(), "could not record last authentication");
        }

        if let Some(alias) = &request.alias {
            let claim = AliasClaim::new(alias.clone(), self.aliases.verify(alias, &pubkey).await);
            let ctx = AuthContext::Session {
                user_id: account.user_id.clone(),
            };
            if let Err(err) = self.linker.update_alias(&ctx, &claim) {
                tracing::warn!(%pubkey, code = err.code(), "could not record alias check");
            }
        }

        tracing::info!(user_id = %account.user_id, %pubkey, "login succeeded");
        Ok(LoginResponse {
            user_id: account.user_id,
            pubkey,
            tokens,
        })
    }

    /// Link the signer of `request.signed_event` to the session's account.
    ///
    /// The account must still exist in the [`AccountStore`]; a session for
    /// a deleted account gets [`AuthError::IdentityNotFound`].
    pub async fn link(
        &self,
        ctx: &AuthContext,
        request: &LinkRequest,
    ) -> Result<NostrIdentity, AuthError> {
        let user_id = session_user(ctx)?;
        if self.accounts.find_by_id(&user_id).await?.is_none() {
            tracing::warn!(%user_id, "link attempted for an unknown account");
            return Err(AuthError::IdentityNotFound);
        }
        let claim = match &request.alias {
            Some(alias) => {
                let pubkey = request.signed_event.pubkey.to_lowercase();
                let verification = self.aliases.verify(alias, &pubkey).await;
                Some(AliasClaim::new(alias.clone(), verification))
            }
            None => None,
        };
        self.linker
            .complete_link(ctx, &request.signed_event, claim.as_ref())
    }

    /// Authenticate one request from its `Authorization: Nostr …` header.
    pub fn authenticate_proof(
        &self,
        header: &str,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
    ) -> Result<AuthContext, AuthError> {
        let event = parse_proof_header(header)
            .ok_or_else(|| AuthError::Malformed("unreadable Nostr authorization header".into()))?;
        let outcome = match body {
            Some(body) => self
                .proofs
                .verify_request_proof_with_body(&event, url, method, body),
            None => self.proofs.verify_request_proof(&event, url, method),
        };
        let pubkey = outcome.into_result()?;
        Ok(AuthContext::Proof { pubkey })
    }

    /// Classify a request by its `Authorization` header.
    ///
    /// No header means [`AuthContext::Unauthenticated`]. A header that is
    /// present but doesn't check out is an error, never a silent downgrade.
    pub async fn context_from_header(
        &self,
        authorization: Option<&str>,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
    ) -> Result<AuthContext, AuthError> {
        let Some(header) = authorization else {
            return Ok(AuthContext::Unauthenticated);
        };
        let (scheme, credentials) = header
            .trim()
            .split_once(' ')
            .ok_or(AuthError::Unauthenticated)?;

        if scheme.eq_ignore_ascii_case("bearer") {
            let user_id = self
                .sessions
                .verify_access_token(credentials.trim())
                .await
                .ok_or(AuthError::Unauthenticated)?;
            return Ok(AuthContext::Session { user_id });
        }
        if scheme.eq_ignore_ascii_case(crate::config::PROOF_HEADER_SCHEME) {
            return self.authenticate_proof(header, url, method, body);
        }
        Err(AuthError::Unauthenticated)
    }
}
