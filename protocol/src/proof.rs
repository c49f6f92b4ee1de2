//! # Per-Request Signed Proofs (NIP-98)
//!
//! The stateless half of authentication. A client signs a kind-27235
//! event naming the exact URL and method of the request it is about to
//! make, base64-encodes the JSON and sends it as
//!
//! ```text
//! Authorization: Nostr <base64(event json)>
//! ```
//!
//! The server accepts it if the event verifies, the `u` and `method` tags
//! match the request byte for byte, and `created_at` is within the proof
//! window of the server clock (60 s either way by default). If the event
//! carries a `payload` tag it must be the hex SHA-256 of the request body.
//!
//! ## Replay
//!
//! There is no nonce here: a captured header can be replayed against the
//! same URL and method until it leaves the window. Deployments that care
//! enable [`ProofReplayCache`], which remembers every accepted
//! `(pubkey, id)` for as long as it could still pass the window check and
//! rejects repeats with [`AuthError::ProofReplayed`]. The cache is per
//! process.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    unix_now, AuthConfig, HTTP_AUTH_EVENT_KIND, METHOD_TAG, PAYLOAD_TAG, PROOF_HEADER_SCHEME,
    PROOF_WINDOW, REPLAY_CACHE_EVICT_EVERY, URL_TAG,
};
use crate::error::AuthError;
use crate::event::{sha256_hex, verify, SignedEvent};

/// Standard alphabet; padded on encode, padding optional on decode.
const PROOF_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ---------------------------------------------------------------------------
// Header codec
// ---------------------------------------------------------------------------

/// Decode an `Authorization` header value into an event.
///
/// Returns `None` for a different scheme, bad base64 or bad JSON. The
/// scheme token is matched case-insensitively, as HTTP requires.
pub fn parse_proof_header(header: &str) -> Option<SignedEvent> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(PROOF_HEADER_SCHEME) {
        return None;
    }
    let json = PROOF_BASE64.decode(encoded.trim()).ok()?;
    serde_json::from_slice(&json).ok()
}

/// Build the `Authorization` header value for an event.
pub fn encode_proof_header(event: &SignedEvent) -> String {
    let json = serde_json::to_vec(event).unwrap_or_default();
    format!("{} {}", PROOF_HEADER_SCHEME, PROOF_BASE64.encode(json))
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of checking a request proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProofOutcome {
    pub valid: bool,
    pub pubkey: Option<String>,
    #[serde(skip)]
    pub error: Option<AuthError>,
}

impl ProofOutcome {
    pub fn into_result(self) -> Result<String, AuthError> {
        match (self.pubkey, self.error) {
            (Some(pubkey), None) if self.valid => Ok(pubkey),
            (_, Some(err)) => Err(err),
            _ => Err(AuthError::SignatureInvalid("rejected".into())),
        }
    }
}

impl From<Result<String, AuthError>> for ProofOutcome {
    fn from(r: Result<String, AuthError>) -> Self {
        match r {
            Ok(pubkey) => Self {
                valid: true,
                pubkey: Some(pubkey),
                error: None,
            },
            Err(err) => Self {
                valid: false,
                pubkey: None,
                error: Some(err),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Replay cache
// ---------------------------------------------------------------------------

/// Remembers accepted proofs until they fall out of the window.
///
/// Every [`REPLAY_CACHE_EVICT_EVERY`] inserts the cache evicts entries
/// outside the window of the proof just recorded, so it stays bounded even
/// if nobody calls [`ProofReplayCache::evict_expired`].
#[derive(Debug)]
pub struct ProofReplayCache {
    seen: DashMap<(String, String), u64>,
    window: Duration,
    inserts: AtomicUsize,
}

impl ProofReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Record a proof. Fails if the same `(pubkey, id)` was recorded before
    /// and not yet evicted.
    pub fn check_and_record(&self, pubkey: &str, id: &str, created_at: u64) -> Result<(), AuthError> {
        match self.seen.entry((pubkey.to_string(), id.to_string())) {
            Entry::Occupied(_) => return Err(AuthError::ProofReplayed),
            Entry::Vacant(slot) => {
                slot.insert(created_at);
            }
        }

        // The entry guard is released above; `retain` needs every shard.
        let inserted = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserted % REPLAY_CACHE_EVICT_EVERY == 0 {
            let removed = self.evict_expired(created_at);
            tracing::debug!(removed, "replay cache self-evicted");
        }
        Ok(())
    }

    /// Drop proofs that can no longer pass the window check. Returns how
    /// many were removed.
    pub fn evict_expired(&self, now: u64) -> usize {
        let window = self.window.as_secs();
        let before = self.seen.len();
        self.seen
            .retain(|_, created_at| now.abs_diff(*created_at) <= window);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Checks NIP-98 proofs against the request they arrived with.
#[derive(Debug, Clone)]
pub struct ProofVerifier {
    window: Duration,
    replay: Option<Arc<ProofReplayCache>>,
}

impl Default for ProofVerifier {
    fn default() -> Self {
        Self {
            window: PROOF_WINDOW,
            replay: None,
        }
    }
}

impl ProofVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            window: config.proof_window,
            replay: None,
        }
    }

    /// Reject repeats of an accepted proof. See the module docs.
    ///
    /// The cache trims itself every [`REPLAY_CACHE_EVICT_EVERY`] accepted
    /// proofs. Long-running callers should still run
    /// [`ProofReplayCache::evict_expired`] periodically to release memory
    /// during quiet spells.
    pub fn with_replay_cache(mut self) -> Self {
        self.replay = Some(Arc::new(ProofReplayCache::new(self.window)));
        self
    }

    pub fn replay_cache(&self) -> Option<&Arc<ProofReplayCache>> {
        self.replay.as_ref()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn verify_request_proof(&self, event: &SignedEvent, url: &str, method: &str) -> ProofOutcome {
        self.check(event, url, method, None, unix_now()).into()
    }

    pub fn verify_request_proof_at(
        &self,
        event: &SignedEvent,
        url: &str,
        method: &str,
        now: u64,
    ) -> ProofOutcome {
        self.check(event, url, method, None, now).into()
    }

    /// Like [`verify_request_proof`](Self::verify_request_proof), also
    /// binding the `payload` tag (when present) to `body`.
    pub fn verify_request_proof_with_body(
        &self,
        event: &SignedEvent,
        url: &str,
        method: &str,
        body: &[u8],
    ) -> ProofOutcome {
        self.check(event, url, method, Some(body), unix_now()).into()
    }

    pub fn verify_request_proof_with_body_at(
        &self,
        event: &SignedEvent,
        url: &str,
        method: &str,
        body: &[u8],
        now: u64,
    ) -> ProofOutcome {
        self.check(event, url, method, Some(body), now).into()
    }

    fn check(
        &self,
        event: &SignedEvent,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
        now: u64,
    ) -> Result<String, AuthError> {
        let result = self.check_inner(event, url, method, body, now);
        match &result {
            Ok(pubkey) => tracing::debug!(%pubkey, %url, %method, "request proof accepted"),
            Err(err) => tracing::warn!(%url, %method, code = err.code(), "request proof rejected"),
        }
        result
    }

    fn check_inner(
        &self,
        event: &SignedEvent,
        url: &str,
        method: &str,
        body: Option<&[u8]>,
        now: u64,
    ) -> Result<String, AuthError> {
        if event.kind != HTTP_AUTH_EVENT_KIND {
            return Err(AuthError::Malformed(format!(
                "expected kind {}, got {}",
                HTTP_AUTH_EVENT_KIND, event.kind
            )));
        }

        if event.first_tag_value(URL_TAG) != Some(url) {
            return Err(AuthError::RequestMismatch(format!("url is not {}", url)));
        }
        if event.first_tag_value(METHOD_TAG) != Some(method) {
            return Err(AuthError::RequestMismatch(format!("method is not {}", method)));
        }

        let window_secs = self.window.as_secs();
        if now.abs_diff(event.created_at) > window_secs {
            return Err(AuthError::TimestampOutOfWindow {
                created_at: event.created_at,
                now,
                window_secs,
            });
        }

        if let (Some(body), Some(declared)) = (body, event.first_tag_value(PAYLOAD_TAG)) {
            if !declared.eq_ignore_ascii_case(&sha256_hex(body)) {
                return Err(AuthError::PayloadMismatch);
            }
        }

        verify(event).into_result()?;

        let pubkey = event.pubkey.to_lowercase();
        if let Some(cache) = &self.replay {
            cache.check_and_record(&pubkey, &event.id, event.created_at)?;
        }
        Ok(pubkey)
    }
}

/// Check a proof with the default window and no replay cache.
pub fn verify_request_proof(event: &SignedEvent, url: &str, method: &str) -> ProofOutcome {
    ProofVerifier::default().verify_request_proof(event, url, method)
}

/// Check a proof and its body binding with the default window.
pub fn verify_request_proof_with_body(
    event: &SignedEvent,
    url: &str,
    method: &str,
    body: &[u8],
) -> ProofOutcome {
    ProofVerifier::default().verify_request_proof_with_body(event, url, method, body)
}
