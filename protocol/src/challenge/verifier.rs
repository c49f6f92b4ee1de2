//! Issuing challenges and redeeming signed challenge responses.

use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{AuthChallenge, ChallengeStore};
use crate::config::{
    unix_now, AuthConfig, AUTH_EVENT_KIND, CHALLENGE_BYTES, CHALLENGE_TAG, RELAY_TAG,
};
use crate::error::AuthError;
use crate::event::{verify, SignedEvent};

/// Result of redeeming a challenge response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeOutcome {
    pub valid: bool,
    /// Signer of the response, set only when valid.
    pub pubkey: Option<String>,
    #[serde(skip)]
    pub error: Option<AuthError>,
}

impl ChallengeOutcome {
    fn accepted(pubkey: String) -> Self {
        Self {
            valid: true,
            pubkey: Some(pubkey),
            error: None,
        }
    }

    fn rejected(error: AuthError) -> Self {
        Self {
            valid: false,
            pubkey: None,
            error: Some(error),
        }
    }

    /// The signer's pubkey, or the reason for rejection.
    pub fn into_result(self) -> Result<String, AuthError> {
        match (self.pubkey, self.error) {
            (Some(pubkey), None) if self.valid => Ok(pubkey),
            (_, Some(err)) => Err(err),
            _ => Err(AuthError::SignatureInvalid("rejected".into())),
        }
    }
}

/// Issues challenges and verifies the events that answer them.
#[derive(Clone)]
pub struct ChallengeVerifier {
    store: Arc<dyn ChallengeStore>,
    ttl: Duration,
    default_relay: Option<String>,
}

impl std::fmt::Debug for ChallengeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeVerifier")
            .field("ttl", &self.ttl)
            .field("default_relay", &self.default_relay)
            .finish_non_exhaustive()
    }
}

impl ChallengeVerifier {
    pub fn new(store: Arc<dyn ChallengeStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            ttl: config.challenge_ttl,
            default_relay: config.default_relay.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChallengeStore> {
        &self.store
    }

    /// Issue a fresh challenge. Without an explicit relay the configured
    /// default (if any) is recorded.
    pub fn issue_challenge(&self, relay: Option<&str>) -> Result<AuthChallenge, AuthError> {
        self.issue_challenge_at(relay, unix_now())
    }

    pub fn issue_challenge_at(
        &self,
        relay: Option<&str>,
        now: u64,
    ) -> Result<AuthChallenge, AuthError> {
        let mut bytes = [0u8; CHALLENGE_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let challenge = AuthChallenge {
            challenge: hex::encode(bytes),
            issued_at: now,
            expires_at: now.saturating_add(self.ttl.as_secs()),
            relay: relay.map(str::to_owned).or_else(|| self.default_relay.clone()),
            consumed: false,
        };
        self.store.insert(challenge.clone())?;

        tracing::debug!(
            expires_at = challenge.expires_at,
            relay = ?challenge.relay,
            "challenge issued"
        );
        Ok(challenge)
    }

    /// Redeem a signed challenge response.
    pub fn verify_challenge_response(&self, event: &SignedEvent) -> ChallengeOutcome {
        self.verify_challenge_response_at(event, unix_now())
    }

    pub fn verify_challenge_response_at(&self, event: &SignedEvent, now: u64) -> ChallengeOutcome {
        match self.redeem(event, now) {
            Ok(pubkey) => {
                tracing::debug!(%pubkey, "challenge response accepted");
                ChallengeOutcome::accepted(pubkey)
            }
            Err(err) => {
                tracing::warn!(event_id = %event.id, code = err.code(), "challenge response rejected");
                ChallengeOutcome::rejected(err)
            }
        }
    }

    fn redeem(&self, event: &SignedEvent, now: u64) -> Result<String, AuthError> {
        if event.kind != AUTH_EVENT_KIND {
            return Err(AuthError::Malformed(format!(
                "expected kind {}, got {}",
                AUTH_EVENT_KIND, event.kind
            )));
        }

        let challenge = event
            .first_tag_value(CHALLENGE_TAG)
            .ok_or_else(|| AuthError::Malformed("missing challenge tag".into()))?;

        let record = self
            .store
            .get(challenge)?
            .ok_or(AuthError::ChallengeUnknown)?;
        record.check_redeemable(now)?;

        verify(event).into_result()?;

        if let Some(expected) = &record.relay {
            let got = event.first_tag_value(RELAY_TAG).unwrap_or_default();
            if got != expected.as_str() {
                return Err(AuthError::RelayMismatch {
                    expected: expected.clone(),
                    got: got.to_string(),
                });
            }
        }

        // Everything checked; a concurrent redeemer may still beat us here.
        self.store.consume(challenge, now)?;
        Ok(event.pubkey.to_lowercase())
    }

    /// Remove expired challenges. Returns how many were dropped.
    pub fn sweep_expired(&self) -> Result<usize, AuthError> {
        self.sweep_expired_at(unix_now())
    }

    pub fn sweep_expired_at(&self, now: u64) -> Result<usize, AuthError> {
        let removed = self.store.sweep_expired(now)?;
        if removed > 0 {
            tracing::debug!(removed, "swept expired challenges");
        }
        Ok(removed)
    }
}
