//! Cryptographic primitives for certificate authenticity.
//!
//! The DGC backbone signs the SHA-256 hash of a certificate's canonical JSON
//! payload with the issuer's Ed25519 key. All functions here are pure and
//! operate on hex-encoded strings: 32-byte secret and public keys, 64-byte
//! signatures, and lowercase hex digests.
//!
//! The signature covers the UTF-8 bytes of the lowercase hex digest, not the
//! raw digest bytes. Verifiers recompute the canonical hash and check the
//! signature against the issuer public key embedded in the payload.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Byte length of an Ed25519 secret or public key.
pub const KEY_SIZE: usize = 32;

/// Byte length of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Errors produced by key decoding and signing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The hex string could not be decoded.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded key has the wrong length.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The decoded public key is not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Computes the lowercase hex SHA-256 digest of a UTF-8 string.
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signs a hex digest with a hex-encoded Ed25519 secret key.
///
/// # Errors
///
/// Returns [`CryptoError`] when the secret key is not 32 bytes of valid hex.
pub fn sign_hash(hash_hex: &str, secret_key_hex: &str) -> Result<String, CryptoError> {
    let signing_key = decode_signing_key(secret_key_hex)?;
    let signature = signing_key.sign(hash_hex.as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Verifies a hex signature over a hex digest against a hex public key.
///
/// Any decoding failure yields `false`; this mirrors the verification
/// contract where tampered material must never error out of the check.
#[must_use]
pub fn verify_hash(hash_hex: &str, signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(pk_bytes) = decode_fixed::<KEY_SIZE>(public_key_hex) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = decode_fixed::<SIGNATURE_SIZE>(signature_hex) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(hash_hex.as_bytes(), &signature).is_ok()
}

/// Derives the hex public key from a hex secret key.
///
/// # Errors
///
/// Returns [`CryptoError`] when the secret key is not 32 bytes of valid hex.
pub fn derive_public_key(secret_key_hex: &str) -> Result<String, CryptoError> {
    let signing_key = decode_signing_key(secret_key_hex)?;
    Ok(hex::encode(signing_key.verifying_key().to_bytes()))
}

fn decode_signing_key(secret_key_hex: &str) -> Result<SigningKey, CryptoError> {
    let bytes = Zeroizing::new(decode_fixed::<KEY_SIZE>(secret_key_hex)?);
    Ok(SigningKey::from_bytes(&bytes))
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], CryptoError> {
    let raw = hex::decode(input.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    raw.try_into().map_err(|raw: Vec<u8>| CryptoError::InvalidKeyLength {
        expected: N,
        actual: raw.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SK: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sign_verify_round_trip() {
        let hash = sha256_hex("payload");
        let pk = derive_public_key(SK).unwrap();
        let sig = sign_hash(&hash, SK).unwrap();
        assert!(verify_hash(&hash, &sig, &pk));
    }

    #[test]
    fn verify_rejects_tampered_hash() {
        let hash = sha256_hex("payload");
        let pk = derive_public_key(SK).unwrap();
        let sig = sign_hash(&hash, SK).unwrap();
        let other = sha256_hex("tampered");
        assert!(!verify_hash(&other, &sig, &pk));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let hash = sha256_hex("payload");
        let sig = sign_hash(&hash, SK).unwrap();
        let other_sk = "1f".repeat(32);
        let other_pk = derive_public_key(&other_sk).unwrap();
        assert!(!verify_hash(&hash, &sig, &other_pk));
    }

    #[test]
    fn verify_is_false_on_garbage_inputs() {
        assert!(!verify_hash("deadbeef", "not-hex", "also-not-hex"));
        assert!(!verify_hash("deadbeef", &"00".repeat(64), &"00".repeat(16)));
    }

    #[test]
    fn derive_rejects_short_key() {
        assert!(matches!(
            derive_public_key("abcd"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(derive_public_key(SK).unwrap(), derive_public_key(SK).unwrap());
    }
}
