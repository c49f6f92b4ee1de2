//! # Key Management
//!
//! secp256k1 keypairs for Nostr identities, plus parsing and NIP-19
//! (`npub`) encoding of x-only public keys.
//!
//! ## Security considerations
//!
//! - Keys are generated from the thread-local CSPRNG re-exported by
//!   `secp256k1`, which is seeded from the OS.
//! - Secret bytes are never logged. `Debug` prints the public key only.
//! - The server itself never holds user secret keys. [`Keys`] exists for
//!   clients, tests and the `sign-challenge` helper command.

use bech32::{Bech32, Hrp};
use secp256k1::{Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};
use std::fmt;
use thiserror::Error;

use crate::config::{HEX_KEY_LENGTH, NPUB_HRP};

/// Errors that can occur during key operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key: expected 32 bytes of hex in the curve order")]
    InvalidSecretKey,

    #[error("invalid public key: expected 64 hex chars encoding an x-only point")]
    InvalidPublicKey,

    #[error("invalid npub: {0}")]
    InvalidNpub(String),
}

/// A secp256k1 keypair able to produce BIP-340 Schnorr signatures.
///
/// Intentionally not `Serialize`: exporting a secret key should be a
/// conscious call to [`Keys::secret_key_hex`], not a side effect of
/// putting the struct in a JSON response.
#[derive(Clone)]
pub struct Keys {
    keypair: Keypair,
}

impl Keys {
    /// Generate a fresh keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut secp256k1::rand::thread_rng());
        Self { keypair }
    }

    /// Reconstruct a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self {
            keypair: Keypair::from_secret_key(&secp, &secret),
        })
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Self::from_secret_bytes(&arr)
    }

    /// The x-only public key.
    pub fn public_key(&self) -> XOnlyPublicKey {
        self.keypair.x_only_public_key().0
    }

    /// The x-only public key as 64 lowercase hex chars. This is the
    /// `pubkey` field of every event signed by these keys.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key().serialize())
    }

    /// The public key in NIP-19 `npub1…` form.
    pub fn npub(&self) -> String {
        encode_npub(&self.public_key())
    }

    /// Export the secret key as hex. Handle with care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    /// Schnorr-sign a 32-byte digest and return the signature as hex.
    pub(crate) fn sign_digest(&self, digest: [u8; 32]) -> String {
        let secp = Secp256k1::new();
        let msg = Message::from_digest(digest);
        let sig = secp.sign_schnorr(&msg, &self.keypair);
        hex::encode(sig.as_ref())
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keys(pub={})", self.public_key_hex())
    }
}

impl PartialEq for Keys {
    /// Keypairs compare by public key; secret material is never compared.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for Keys {}

// ---------------------------------------------------------------------------
// Public key helpers
// ---------------------------------------------------------------------------

/// Parse a 64-char hex x-only public key. Hex case is ignored.
///
/// Rejects strings of the wrong length and x coordinates that are not on
/// the curve.
pub fn parse_public_key(hex_str: &str) -> Result<XOnlyPublicKey, KeyError> {
    if hex_str.len() != HEX_KEY_LENGTH {
        return Err(KeyError::InvalidPublicKey);
    }
    let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidPublicKey)?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Normalize a public key to lowercase hex after validating it.
pub fn normalize_public_key(hex_str: &str) -> Result<String, KeyError> {
    let key = parse_public_key(hex_str)?;
    Ok(hex::encode(key.serialize()))
}

/// Encode an x-only public key as a NIP-19 `npub`.
pub fn encode_npub(key: &XOnlyPublicKey) -> String {
    let hrp = Hrp::parse(NPUB_HRP).expect("static HRP is valid");
    bech32::encode::<Bech32>(hrp, &key.serialize())
        .expect("encoding a 32-byte payload should never fail")
}

/// Decode a NIP-19 `npub` into lowercase hex.
pub fn decode_npub(npub: &str) -> Result<String, KeyError> {
    let (hrp, data) = bech32::decode(npub).map_err(|e| KeyError::InvalidNpub(e.to_string()))?;
    if hrp.as_str() != NPUB_HRP {
        return Err(KeyError::InvalidNpub(format!(
            "expected '{}' prefix, got '{}'",
            NPUB_HRP, hrp
        )));
    }
    let key = XOnlyPublicKey::from_slice(&data)
        .map_err(|_| KeyError::InvalidNpub("payload is not an x-only key".into()))?;
    Ok(hex::encode(key.serialize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_hex_pubkey() {
        let keys = Keys::generate();
        let hex = keys.public_key_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn secret_hex_roundtrip_preserves_identity() {
        let keys = Keys::generate();
        let restored = Keys::from_secret_hex(&keys.secret_key_hex()).unwrap();
        assert_eq!(keys, restored);
    }

    #[test]
    fn fixed_secret_is_deterministic() {
        let a = Keys::from_secret_bytes(&[7u8; 32]).unwrap();
        let b = Keys::from_secret_bytes(&[7u8; 32]).unwrap();
        assert_eq!(a.public_key_hex(), b.public_key_hex());
    }

    #[test]
    fn zero_secret_rejected() {
        assert_eq!(
            Keys::from_secret_bytes(&[0u8; 32]).unwrap_err(),
            KeyError::InvalidSecretKey
        );
        assert!(Keys::from_secret_hex("abcd").is_err());
        assert!(Keys::from_secret_hex("zz").is_err());
    }

    #[test]
    fn parse_public_key_rejects_bad_input() {
        assert!(parse_public_key("abc").is_err());
        assert!(parse_public_key(&"g".repeat(64)).is_err());
        // x = 0 is not on secp256k1.
        assert!(parse_public_key(&"0".repeat(64)).is_err());
    }

    #[test]
    fn uppercase_hex_normalizes_to_lowercase() {
        let keys = Keys::generate();
        let upper = keys.public_key_hex().to_uppercase();
        assert_eq!(normalize_public_key(&upper).unwrap(), keys.public_key_hex());
    }

    #[test]
    fn npub_roundtrip() {
        let keys = Keys::generate();
        let npub = keys.npub();
        assert!(npub.starts_with("npub1"));
        assert_eq!(decode_npub(&npub).unwrap(), keys.public_key_hex());
    }

    #[test]
    fn npub_with_wrong_hrp_rejected() {
        let keys = Keys::generate();
        let hrp = Hrp::parse("nsec").unwrap();
        let encoded = bech32::encode::<Bech32>(hrp, &keys.public_key().serialize()).unwrap();
        assert!(matches!(
            decode_npub(&encoded),
            Err(KeyError::InvalidNpub(_))
        ));
    }

    #[test]
    fn debug_output_hides_secret() {
        let keys = Keys::generate();
        let debug = format!("{:?}", keys);
        assert!(debug.contains(&keys.public_key_hex()));
        assert!(!debug.contains(&keys.secret_key_hex()));
    }
}
