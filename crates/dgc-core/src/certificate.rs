//! Gold certificate payloads, signing, and the lifecycle state machine.
//!
//! A certificate is authentic when recomputing the SHA-256 of its canonical
//! JSON payload matches the stored `payloadHash` and the Ed25519 signature
//! over that hash verifies against the issuer public key carried in the
//! payload. Any mutation re-signs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::amount::Amount;
use crate::canonical::{self, CanonicalError};
use crate::crypto::{self, CryptoError};

/// Lifecycle states of a certificate.
///
/// Allowed transitions:
///
/// - `ACTIVE → {LOCKED, REDEEMED, REVOKED}`
/// - `LOCKED → {ACTIVE, REDEEMED, REVOKED}`
/// - `REDEEMED` and `REVOKED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateStatus {
    /// Freely transferable.
    #[serde(rename = "ACTIVE")]
    Active,
    /// Held in escrow; only unlock or terminal transitions allowed.
    #[serde(rename = "LOCKED")]
    Locked,
    /// Physically redeemed; terminal.
    #[serde(rename = "REDEEMED")]
    Redeemed,
    /// Withdrawn by the issuer; terminal.
    #[serde(rename = "REVOKED")]
    Revoked,
}

impl CertificateStatus {
    /// Returns true when `self → next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Active => matches!(next, Self::Locked | Self::Redeemed | Self::Revoked),
            Self::Locked => matches!(next, Self::Active | Self::Redeemed | Self::Revoked),
            Self::Redeemed | Self::Revoked => false,
        }
    }

    /// The wire name, e.g. `ACTIVE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Locked => "LOCKED",
            Self::Redeemed => "REDEEMED",
            Self::Revoked => "REVOKED",
        }
    }

    /// Numeric code used by the chain sink encoding.
    #[must_use]
    pub const fn chain_code(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Locked => 1,
            Self::Redeemed => 2,
            Self::Revoked => 3,
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "ACTIVE" => Some(Self::Active),
            "LOCKED" => Some(Self::Locked),
            "REDEEMED" => Some(Self::Redeemed),
            "REVOKED" => Some(Self::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by certificate signing and transitions.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The requested status transition is not allowed.
    #[error("Transition {from} -> {to} is not allowed")]
    IllegalTransition {
        /// Current status.
        from: CertificateStatus,
        /// Requested status.
        to: CertificateStatus,
    },

    /// The payload could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonical(#[from] CanonicalError),

    /// Signing failed (bad issuer key material).
    #[error("signing failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// The signed-over certificate payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoldCertificate {
    /// Opaque unique identifier, `DGC-` prefixed.
    pub cert_id: String,
    /// Issuer Ed25519 public key, lowercase hex.
    pub issuer: String,
    /// Current owner identifier.
    pub owner: String,
    /// Gram amount, canonical four-fractional-digit string on the wire.
    pub amount_gram: Amount,
    /// Purity such as `999.9`.
    pub purity: String,
    /// Issue timestamp, RFC 3339 UTC.
    pub issued_at: String,
    /// Lifecycle status.
    pub status: CertificateStatus,
    /// Optional free-form metadata. Values must satisfy the canonical JSON
    /// profile (no floats).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl GoldCertificate {
    /// Builds a fresh ACTIVE payload stamped with the current time.
    #[must_use]
    pub fn new(
        cert_id: String,
        issuer: String,
        owner: String,
        amount_gram: Amount,
        purity: String,
    ) -> Self {
        Self {
            cert_id,
            issuer,
            owner,
            amount_gram,
            purity,
            issued_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            status: CertificateStatus::Active,
            metadata: None,
        }
    }

    /// Inserts or replaces a metadata entry.
    pub fn set_metadata(&mut self, key: &str, value: Value) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
    }
}

/// A payload plus its canonical hash and issuer signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedCertificate {
    /// The signed-over payload.
    pub payload: GoldCertificate,
    /// SHA-256 hex of the canonical JSON payload.
    pub payload_hash: String,
    /// Ed25519 signature hex over the hash.
    pub signature: String,
}

/// Outcome of verifying a signed certificate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// `hash_matches && signature_valid`.
    pub valid: bool,
    /// Recomputed canonical hash equals the stored hash.
    pub hash_matches: bool,
    /// Signature verifies against the issuer key; only evaluated when the
    /// hash matches, otherwise false.
    pub signature_valid: bool,
    /// Status carried by the payload.
    pub status: CertificateStatus,
}

/// Canonicalizes, hashes, and signs a payload with the issuer secret key.
///
/// # Errors
///
/// Returns [`CertificateError`] when canonicalization or signing fails.
pub fn sign_certificate(
    payload: GoldCertificate,
    issuer_secret_hex: &str,
) -> Result<SignedCertificate, CertificateError> {
    let canonical = canonical::canonical_json_of(&payload)?;
    let payload_hash = crypto::sha256_hex(&canonical);
    let signature = crypto::sign_hash(&payload_hash, issuer_secret_hex)?;
    Ok(SignedCertificate {
        payload,
        payload_hash,
        signature,
    })
}

/// Recomputes the payload hash and checks the issuer signature.
///
/// `signature_valid` is only computed when the hash matches; any internal
/// failure (bad hex, bad key) reports as `false` rather than erroring.
#[must_use]
pub fn verify_certificate(cert: &SignedCertificate) -> VerificationReport {
    let hash_matches = canonical::canonical_json_of(&cert.payload)
        .map(|canonical| crypto::sha256_hex(&canonical) == cert.payload_hash)
        .unwrap_or(false);

    let signature_valid = hash_matches
        && crypto::verify_hash(&cert.payload_hash, &cert.signature, &cert.payload.issuer);

    VerificationReport {
        valid: hash_matches && signature_valid,
        hash_matches,
        signature_valid,
        status: cert.payload.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SK: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn sample() -> GoldCertificate {
        GoldCertificate::new(
            "DGC-TEST-001".into(),
            crypto::derive_public_key(SK).unwrap(),
            "0xA".into(),
            Amount::parse("1.25").unwrap(),
            "999.9".into(),
        )
    }

    #[test]
    fn signed_certificate_verifies() {
        let signed = sign_certificate(sample(), SK).unwrap();
        let report = verify_certificate(&signed);
        assert!(report.valid);
        assert!(report.hash_matches);
        assert!(report.signature_valid);
        assert_eq!(report.status, CertificateStatus::Active);
    }

    #[test]
    fn tampered_payload_fails_both_checks() {
        let mut signed = sign_certificate(sample(), SK).unwrap();
        signed.payload.amount_gram = Amount::parse("3.0000").unwrap();
        let report = verify_certificate(&signed);
        assert!(!report.valid);
        assert!(!report.hash_matches);
        assert!(!report.signature_valid);
    }

    #[test]
    fn tampered_signature_fails_signature_check_only() {
        let mut signed = sign_certificate(sample(), SK).unwrap();
        signed.signature = "00".repeat(64);
        let report = verify_certificate(&signed);
        assert!(report.hash_matches);
        assert!(!report.signature_valid);
        assert!(!report.valid);
    }

    #[test]
    fn status_machine_allowed_transitions() {
        use CertificateStatus::{Active, Locked, Redeemed, Revoked};
        assert!(Active.can_transition_to(Locked));
        assert!(Active.can_transition_to(Redeemed));
        assert!(Active.can_transition_to(Revoked));
        assert!(Locked.can_transition_to(Active));
        assert!(Locked.can_transition_to(Redeemed));
        assert!(Locked.can_transition_to(Revoked));
    }

    #[test]
    fn status_machine_terminal_states() {
        use CertificateStatus::{Active, Locked, Redeemed, Revoked};
        for next in [Active, Locked, Revoked, Redeemed] {
            assert!(!Redeemed.can_transition_to(next));
            assert!(!Revoked.can_transition_to(next));
        }
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn illegal_transition_message() {
        let err = CertificateError::IllegalTransition {
            from: CertificateStatus::Redeemed,
            to: CertificateStatus::Active,
        };
        assert_eq!(err.to_string(), "Transition REDEEMED -> ACTIVE is not allowed");
    }

    #[test]
    fn chain_codes() {
        assert_eq!(CertificateStatus::Active.chain_code(), 0);
        assert_eq!(CertificateStatus::Locked.chain_code(), 1);
        assert_eq!(CertificateStatus::Redeemed.chain_code(), 2);
        assert_eq!(CertificateStatus::Revoked.chain_code(), 3);
    }

    #[test]
    fn amount_serializes_canonically_in_payload() {
        let signed = sign_certificate(sample(), SK).unwrap();
        let json = serde_json::to_value(&signed.payload).unwrap();
        assert_eq!(json["amountGram"], "1.2500");
        assert_eq!(json["status"], "ACTIVE");
    }

    #[test]
    fn metadata_participates_in_hash() {
        let mut payload = sample();
        let signed_without = sign_certificate(payload.clone(), SK).unwrap();
        payload.set_metadata("lastTransferAt", serde_json::json!("2026-01-01T00:00:00Z"));
        let signed_with = sign_certificate(payload, SK).unwrap();
        assert_ne!(signed_without.payload_hash, signed_with.payload_hash);
    }
}
