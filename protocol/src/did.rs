//! # `did:nostr` Identity Documents
//!
//! Maps a Nostr public key to a W3C DID Core document. The method-specific
//! identifier is the key itself, so resolution needs no registry and no
//! network:
//!
//! ```text
//! did:nostr:<64 hex chars>
//! ```
//!
//! Hex is accepted in either case and normalized to lowercase.
//!
//! ## Document
//!
//! - one `Multikey` verification method, `{did}#key-1`, whose
//!   `publicKeyMultibase` is `z` + base58btc(`0xe7 0x01` ‖ `0x02` ‖ x-only
//!   key): the multicodec `secp256k1-pub` prefix in front of the
//!   compressed point with even y (BIP-340 keys always have even y)
//! - `authentication` and `assertionMethod` referencing it
//! - `alsoKnownAs` with the `nostr:npub1…` URI
//! - a `NostrAlias` service, only when an alias has been verified
//!
//! Building a document is a pure function of its inputs. There is no
//! `created` timestamp, so resolving twice yields identical bytes.
//!
//! ## Standards References
//!
//! - [DID Core v1.0](https://www.w3.org/TR/did-core/)
//! - [Multikey](https://www.w3.org/TR/controller-document/#multikey)
//! - [DID Resolution](https://w3c-ccg.github.io/did-resolution/)

use serde::{Deserialize, Serialize};

use crate::config::DID_PREFIX;
use crate::error::AuthError;
use crate::event::{encode_npub, parse_public_key};
use crate::identity::AliasClaim;

/// Context URI for the W3C DID Core specification.
const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Context URI for Multikey verification methods.
const MULTIKEY_CONTEXT: &str = "https://w3id.org/security/multikey/v1";

const VERIFICATION_KEY_TYPE: &str = "Multikey";

const ALIAS_SERVICE_TYPE: &str = "NostrAlias";

/// Multicodec varint for `secp256k1-pub`.
const SECP256K1_PUB_MULTICODEC: [u8; 2] = [0xe7, 0x01];

/// SEC1 prefix of a compressed point with even y.
const EVEN_Y_PREFIX: u8 = 0x02;

/// Resolution error code for syntactically invalid DIDs.
pub const INVALID_DID: &str = "invalidDid";

const DID_LD_JSON: &str = "application/did+ld+json";

// ---------------------------------------------------------------------------
// Syntax
// ---------------------------------------------------------------------------

/// The DID for a (lowercase hex) public key.
pub fn did_for_pubkey(pubkey: &str) -> String {
    format!("{}{}", DID_PREFIX, pubkey)
}

/// Validate a `did:nostr` string and return its public key in lowercase.
///
/// The identifier must be 64 hex chars and a valid x-only point.
pub fn parse_did(did: &str) -> Result<String, AuthError> {
    let identifier = did
        .strip_prefix(DID_PREFIX)
        .ok_or_else(|| AuthError::InvalidDid(format!("expected prefix {}", DID_PREFIX)))?;
    let key = parse_public_key(identifier)
        .map_err(|_| AuthError::InvalidDid("identifier is not a 64-hex x-only key".into()))?;
    Ok(hex::encode(key.serialize()))
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub also_known_as: Vec<String>,
    pub verification_method: Vec<VerificationMethod>,
    pub authentication: Vec<String>,
    pub assertion_method: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub controller: String,
    pub public_key_multibase: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub service_endpoint: String,
}

/// `z`-prefixed base58btc multikey for an x-only public key.
fn public_key_multibase(xonly: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(35);
    bytes.extend_from_slice(&SECP256K1_PUB_MULTICODEC);
    bytes.push(EVEN_Y_PREFIX);
    bytes.extend_from_slice(xonly);
    format!("z{}", bs58::encode(bytes).into_string())
}

/// Build the document for a public key. Accepts either hex case.
///
/// The alias appears as a service only if its verification succeeded.
pub fn build_document(pubkey: &str, alias: Option<&AliasClaim>) -> Result<DidDocument, AuthError> {
    let key = parse_public_key(pubkey)
        .map_err(|_| AuthError::InvalidDid("not a 64-hex x-only key".into()))?;
    let xonly = key.serialize();
    let did = did_for_pubkey(&hex::encode(xonly));
    let key_id = format!("{}#key-1", did);

    let service = alias
        .filter(|claim| claim.is_verified())
        .map(|claim| Service {
            id: format!("{}#alias", did),
            type_: ALIAS_SERVICE_TYPE.to_string(),
            service_endpoint: claim.alias.clone(),
        })
        .into_iter()
        .collect();

    Ok(DidDocument {
        context: vec![DID_CONTEXT.to_string(), MULTIKEY_CONTEXT.to_string()],
        id: did.clone(),
        also_known_as: vec![format!("nostr:{}", encode_npub(&key))],
        verification_method: vec![VerificationMethod {
            id: key_id.clone(),
            type_: VERIFICATION_KEY_TYPE.to_string(),
            controller: did,
            public_key_multibase: public_key_multibase(&xonly),
        }],
        authentication: vec![key_id.clone()],
        assertion_method: vec![key_id],
        service,
    })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Metadata about the document itself. Nothing is tracked yet, so this
/// always serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub did_document: Option<DidDocument>,
    pub did_document_metadata: DocumentMetadata,
    pub did_resolution_metadata: ResolutionMetadata,
}

impl ResolutionResult {
    fn invalid(reason: &AuthError) -> Self {
        tracing::debug!(%reason, "DID resolution rejected");
        Self {
            did_document: None,
            did_document_metadata: DocumentMetadata::default(),
            did_resolution_metadata: ResolutionMetadata {
                content_type: None,
                error: Some(INVALID_DID.to_string()),
            },
        }
    }

    fn found(document: DidDocument) -> Self {
        Self {
            did_document: Some(document),
            did_document_metadata: DocumentMetadata::default(),
            did_resolution_metadata: ResolutionMetadata {
                content_type: Some(DID_LD_JSON.to_string()),
                error: None,
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.did_resolution_metadata.error.is_some()
    }
}

/// Resolve a DID with an alias the caller already has.
pub fn resolve(did: &str, alias: Option<&AliasClaim>) -> ResolutionResult {
    match parse_did(did).and_then(|pubkey| build_document(&pubkey, alias)) {
        Ok(document) => ResolutionResult::found(document),
        Err(err) => ResolutionResult::invalid(&err),
    }
}

/// Resolve a DID, asking `lookup` for the key's alias only once the DID
/// has passed syntax validation.
pub fn resolve_with<F, E>(did: &str, lookup: F) -> Result<ResolutionResult, E>
where
    F: FnOnce(&str) -> Result<Option<AliasClaim>, E>,
{
    let pubkey = match parse_did(did) {
        Ok(pubkey) => pubkey,
        Err(err) => return Ok(ResolutionResult::invalid(&err)),
    };
    let alias = lookup(&pubkey)?;
    Ok(resolve(did, alias.as_ref()))
}
