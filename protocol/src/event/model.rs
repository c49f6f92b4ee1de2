//! Signed and unsigned Nostr events, and the builder that produces them.
//!
//! The [`EventBuilder`] follows the same flow every client uses: pick a
//! kind, add tags and content, `.build()` an [`UnsignedEvent`], then
//! [`UnsignedEvent::sign`] it with a [`Keys`]. Signing fills in the
//! public key, derives the ID from the canonical form and attaches the
//! Schnorr signature.

use serde::{Deserialize, Serialize};

use super::canonical::{canonical_form, event_digest};
use super::keys::Keys;
use crate::config::{
    unix_now, AUTH_EVENT_KIND, CHALLENGE_TAG, HTTP_AUTH_EVENT_KIND, METHOD_TAG, PAYLOAD_TAG,
    RELAY_TAG, URL_TAG,
};
use crate::error::AuthError;

/// A single tag: a name followed by zero or more values.
pub type Tag = Vec<String>;

// ---------------------------------------------------------------------------
// SignedEvent
// ---------------------------------------------------------------------------

/// A Nostr event as it travels on the wire.
///
/// Nothing here is trusted on deserialization. Run it through
/// [`super::verify`] before relying on `pubkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Lowercase hex SHA-256 of the canonical form.
    pub id: String,

    /// Lowercase hex x-only public key of the author.
    pub pubkey: String,

    /// Unix time in seconds.
    pub created_at: u64,

    pub kind: u32,

    pub tags: Vec<Tag>,

    pub content: String,

    /// Hex BIP-340 signature over the 32 raw bytes of `id`.
    pub sig: String,
}

impl SignedEvent {
    /// Canonical serialization of the signed fields.
    pub fn canonical_form(&self) -> String {
        canonical_form(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Recompute the ID from the current field values.
    pub fn compute_id(&self) -> String {
        hex::encode(event_digest(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
    }

    /// Value of the first tag named `name`, if it has one.
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        first_tag_value(&self.tags, name)
    }

    /// First value of every tag named `name`, in order.
    pub fn tag_values(&self, name: &str) -> Vec<&str> {
        tag_values(&self.tags, name)
    }
}

pub(crate) fn first_tag_value<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.first().map(String::as_str) == Some(name))
        .and_then(|t| t.get(1))
        .map(String::as_str)
}

pub(crate) fn tag_values<'a>(tags: &'a [Tag], name: &str) -> Vec<&'a str> {
    tags.iter()
        .filter(|t| t.first().map(String::as_str) == Some(name))
        .filter_map(|t| t.get(1))
        .map(String::as_str)
        .collect()
}

// ---------------------------------------------------------------------------
// UnsignedEvent
// ---------------------------------------------------------------------------

/// An event that has not been signed yet.
///
/// `pubkey` may be left empty; [`UnsignedEvent::sign`] fills it from the
/// signing key. If it is set, it must belong to that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    pub pubkey: Option<String>,
    pub created_at: u64,
    pub kind: u32,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl UnsignedEvent {
    /// ID this event will have once signed by `pubkey`.
    pub fn compute_id(&self, pubkey: &str) -> String {
        hex::encode(event_digest(
            pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
    }

    /// Sign the event.
    ///
    /// Returns [`AuthError::PubkeyMismatch`] if a public key was already set
    /// and it isn't the one belonging to `keys`.
    pub fn sign(self, keys: &Keys) -> Result<SignedEvent, AuthError> {
        let signer = keys.public_key_hex();
        if let Some(declared) = &self.pubkey {
            if !declared.eq_ignore_ascii_case(&signer) {
                return Err(AuthError::PubkeyMismatch {
                    declared: declared.clone(),
                    signer,
                });
            }
        }

        let digest = event_digest(
            &signer,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        let sig = keys.sign_digest(digest);

        Ok(SignedEvent {
            id: hex::encode(digest),
            pubkey: signer,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        })
    }
}

// ---------------------------------------------------------------------------
// EventBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`UnsignedEvent`]s.
///
/// ```rust
/// use nostr_auth::event::{EventBuilder, Keys};
///
/// let keys = Keys::generate();
/// let event = EventBuilder::new(1)
///     .tag(["t", "hello"])
///     .content("gm")
///     .build()
///     .sign(&keys)
///     .unwrap();
/// assert_eq!(event.pubkey, keys.public_key_hex());
/// ```
///
/// `created_at` defaults to the current time at `build()`.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: u32,
    pubkey: Option<String>,
    created_at: Option<u64>,
    tags: Vec<Tag>,
    content: String,
}

impl EventBuilder {
    pub fn new(kind: u32) -> Self {
        Self {
            kind,
            pubkey: None,
            created_at: None,
            tags: Vec::new(),
            content: String::new(),
        }
    }

    /// NIP-42 challenge response. `relay` is added only when given.
    pub fn auth_response(challenge: &str, relay: Option<&str>) -> Self {
        let builder = Self::new(AUTH_EVENT_KIND).tag([CHALLENGE_TAG, challenge]);
        match relay {
            Some(r) => builder.tag([RELAY_TAG, r]),
            None => builder,
        }
    }

    /// NIP-98 HTTP proof for one request. `payload_hash` is the hex SHA-256
    /// of the body, if the client wants to bind it.
    pub fn http_proof(url: &str, method: &str, payload_hash: Option<&str>) -> Self {
        let builder = Self::new(HTTP_AUTH_EVENT_KIND)
            .tag([URL_TAG, url])
            .tag([METHOD_TAG, method]);
        match payload_hash {
            Some(h) => builder.tag([PAYLOAD_TAG, h]),
            None => builder,
        }
    }

    /// Pin the author. Signing with a different key will fail.
    pub fn pubkey(mut self, pubkey: &str) -> Self {
        self.pubkey = Some(pubkey.to_string());
        self
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn build(self) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: self.pubkey,
            created_at: self.created_at.unwrap_or_else(unix_now),
            kind: self.kind,
            tags: self.tags,
            content: self.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_fills_pubkey_and_id() {
        let keys = Keys::generate();
        let event = EventBuilder::new(1)
            .created_at(1_700_000_000)
            .content("hello")
            .build()
            .sign(&keys)
            .unwrap();

        assert_eq!(event.pubkey, keys.public_key_hex());
        assert_eq!(event.id, event.compute_id());
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);
        assert_eq!(event.created_at, 1_700_000_000);
    }

    #[test]
    fn unsigned_id_matches_signed_id() {
        let keys = Keys::generate();
        let unsigned = EventBuilder::new(7).content("x").build();
        let expected = unsigned.compute_id(&keys.public_key_hex());
        let signed = unsigned.sign(&keys).unwrap();
        assert_eq!(signed.id, expected);
    }

    #[test]
    fn sign_rejects_foreign_pubkey() {
        let keys = Keys::generate();
        let other = Keys::generate();
        let err = EventBuilder::new(1)
            .pubkey(&other.public_key_hex())
            .build()
            .sign(&keys)
            .unwrap_err();
        assert!(matches!(err, AuthError::PubkeyMismatch { .. }));
    }

    #[test]
    fn sign_accepts_matching_pubkey() {
        let keys = Keys::generate();
        let event = EventBuilder::new(1)
            .pubkey(&keys.public_key_hex())
            .build()
            .sign(&keys);
        assert!(event.is_ok());
    }

    #[test]
    fn builder_defaults_created_at_to_now() {
        let before = unix_now();
        let unsigned = EventBuilder::new(1).build();
        assert!(unsigned.created_at >= before);
        assert!(unsigned.created_at <= unix_now());
    }

    #[test]
    fn auth_response_tags() {
        let unsigned = EventBuilder::auth_response("abc", Some("wss://relay.example")).build();
        assert_eq!(unsigned.kind, AUTH_EVENT_KIND);
        assert_eq!(first_tag_value(&unsigned.tags, CHALLENGE_TAG), Some("abc"));
        assert_eq!(
            first_tag_value(&unsigned.tags, RELAY_TAG),
            Some("wss://relay.example")
        );

        let bare = EventBuilder::auth_response("abc", None).build();
        assert_eq!(bare.tags.len(), 1);
    }

    #[test]
    fn http_proof_tags() {
        let unsigned = EventBuilder::http_proof("https://a.example/x", "GET", None).build();
        assert_eq!(unsigned.kind, HTTP_AUTH_EVENT_KIND);
        assert_eq!(
            first_tag_value(&unsigned.tags, URL_TAG),
            Some("https://a.example/x")
        );
        assert_eq!(first_tag_value(&unsigned.tags, METHOD_TAG), Some("GET"));
        assert_eq!(first_tag_value(&unsigned.tags, PAYLOAD_TAG), None);
    }

    #[test]
    fn tag_helpers() {
        let tags: Vec<Tag> = vec![
            vec!["p".into(), "one".into()],
            vec!["e".into(), "x".into()],
            vec!["p".into(), "two".into(), "wss://r".into()],
            vec!["p".into()],
        ];
        assert_eq!(first_tag_value(&tags, "p"), Some("one"));
        assert_eq!(tag_values(&tags, "p"), vec!["one", "two"]);
        assert_eq!(first_tag_value(&tags, "q"), None);
        assert!(tag_values(&tags, "q").is_empty());
    }

    #[test]
    fn wire_format_field_names() {
        let keys = Keys::generate();
        let event = EventBuilder::new(1).build().sign(&keys).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        let obj = json.as_object().unwrap();
        for field in ["id", "pubkey", "created_at", "kind", "tags", "content", "sig"] {
            assert!(obj.contains_key(field), "missing {field}");
        }
        assert_eq!(obj.len(), 7);
    }
}
