//! # Protocol Configuration & Constants
//!
//! Every magic number in the authentication core lives here. If you're
//! hardcoding an event kind or a timeout somewhere else, move it here.
//!
//! Most of these values are fixed by the Nostr NIPs we interoperate with
//! (NIP-01 hashing, NIP-42 auth events, NIP-98 HTTP auth). Changing those
//! breaks every client in the wild, so only the timing knobs are exposed
//! through [`AuthConfig`].

use std::time::Duration;

// ---------------------------------------------------------------------------
// Event Kinds
// ---------------------------------------------------------------------------

/// NIP-42 client authentication event. Challenge responses must use it.
pub const AUTH_EVENT_KIND: u32 = 22242;

/// NIP-98 HTTP auth event. Per-request proofs must use it.
pub const HTTP_AUTH_EVENT_KIND: u32 = 27235;

// ---------------------------------------------------------------------------
// Tag Names
// ---------------------------------------------------------------------------

/// Tag carrying the server-issued challenge string.
pub const CHALLENGE_TAG: &str = "challenge";

/// Tag carrying the relay (purpose) the challenge was issued for.
pub const RELAY_TAG: &str = "relay";

/// Tag carrying the absolute request URL in an HTTP proof.
pub const URL_TAG: &str = "u";

/// Tag carrying the HTTP method in an HTTP proof.
pub const METHOD_TAG: &str = "method";

/// Optional tag carrying the hex SHA-256 of the request body.
pub const PAYLOAD_TAG: &str = "payload";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Scheme token prefixing the base64 event in an `Authorization` header.
pub const PROOF_HEADER_SCHEME: &str = "Nostr";

/// Length of the hex-encoded event ID and public key.
pub const HEX_KEY_LENGTH: usize = 64;

/// Length of the hex-encoded Schnorr signature.
pub const HEX_SIGNATURE_LENGTH: usize = 128;

/// Random bytes per challenge. 32 bytes = 256 bits, hex-encoded to 64 chars.
pub const CHALLENGE_BYTES: usize = 32;

/// Bech32 human-readable prefix for public keys (NIP-19).
pub const NPUB_HRP: &str = "npub";

// ---------------------------------------------------------------------------
// DID Method
// ---------------------------------------------------------------------------

/// DID method name. Identifiers look like `did:nostr:<64-hex>`.
pub const DID_METHOD: &str = "nostr";

/// Full DID prefix including the method.
pub const DID_PREFIX: &str = "did:nostr:";

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// How long an issued challenge stays redeemable. Five minutes is enough
/// for a browser extension prompt and short enough to keep the store small.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Allowed distance between an HTTP proof's `created_at` and server time,
/// in either direction.
pub const PROOF_WINDOW: Duration = Duration::from_secs(60);

/// The proof replay cache evicts stale entries on its own after this many
/// inserts, on top of any sweeps the caller runs.
pub const REPLAY_CACHE_EVICT_EVERY: usize = 1024;

/// How often the server sweeps expired challenges out of the store.
pub const CHALLENGE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for the verifiers.
///
/// Defaults come from the constants above. The server overrides them from
/// CLI flags; tests shrink them to exercise expiry paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Lifetime of an issued challenge.
    pub challenge_ttl: Duration,

    /// Accepted clock distance for HTTP proofs.
    pub proof_window: Duration,

    /// Relay URL stamped on login challenges when the caller doesn't
    /// provide one.
    pub default_relay: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: CHALLENGE_TTL,
            proof_window: PROOF_WINDOW,
            default_relay: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Current Unix time in seconds. A clock before 1970 reads as zero.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds_are_distinct() {
        assert_ne!(AUTH_EVENT_KIND, HTTP_AUTH_EVENT_KIND);
    }

    #[test]
    fn test_challenge_hex_length_matches_key_length() {
        // A hex challenge is the same width as an event ID.
        assert_eq!(CHALLENGE_BYTES * 2, HEX_KEY_LENGTH);
        assert_eq!(HEX_SIGNATURE_LENGTH, HEX_KEY_LENGTH * 2);
    }

    #[test]
    fn test_did_prefix_contains_method() {
        assert_eq!(DID_PREFIX, format!("did:{}:", DID_METHOD));
    }

    #[test]
    fn test_timing_constants_sanity() {
        // A proof window longer than a challenge lifetime would make the
        // stateless scheme weaker than the stateful one.
        assert!(PROOF_WINDOW < CHALLENGE_TTL);
        assert!(CHALLENGE_SWEEP_INTERVAL.as_secs() > 0);
    }

    #[test]
    fn test_default_config_uses_constants() {
        let cfg = AuthConfig::default();
        assert_eq!(cfg.challenge_ttl, CHALLENGE_TTL);
        assert_eq!(cfg.proof_window, PROOF_WINDOW);
        assert!(cfg.default_relay.is_none());
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_API_PORT, DEFAULT_METRICS_PORT);
    }
}
