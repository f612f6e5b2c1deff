//! Lineage events and proof anchors.
//!
//! `LedgerEvent` is the tagged union recorded on a certificate's timeline.
//! Implementations decode by the `type` discriminator and reject unknown
//! variants. `ProofAnchor` binds a payload hash to a moment of anchoring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::canonical;
use crate::certificate::CertificateStatus;
use crate::crypto;

/// Validation errors for incoming events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required field is empty.
    #[error("invalid event: {field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A split event carries a non-positive child amount.
    #[error("invalid event: amountChildGram must be positive")]
    NonPositiveSplitAmount,
}

/// A lineage event on a certificate timeline.
///
/// Serialized with a `type` discriminator; unknown variants are rejected at
/// decode time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A certificate was issued.
    #[serde(rename = "ISSUED", rename_all = "camelCase")]
    Issued {
        /// Certificate identifier.
        cert_id: String,
        /// When the operation occurred, RFC 3339 UTC.
        occurred_at: String,
        /// Proof hash bound to this event, when anchored.
        #[serde(skip_serializing_if = "Option::is_none")]
        proof_hash: Option<String>,
        /// Initial owner.
        owner: String,
        /// Issued gram amount.
        amount_gram: Amount,
        /// Purity such as `999.9`.
        purity: String,
    },

    /// Ownership moved between parties.
    #[serde(rename = "TRANSFER", rename_all = "camelCase")]
    Transfer {
        /// Certificate identifier.
        cert_id: String,
        /// When the operation occurred, RFC 3339 UTC.
        occurred_at: String,
        /// Proof hash bound to this event, when anchored.
        #[serde(skip_serializing_if = "Option::is_none")]
        proof_hash: Option<String>,
        /// Previous owner.
        from: String,
        /// New owner.
        to: String,
        /// Gram amount carried by the certificate.
        amount_gram: Amount,
        /// Optional sale price.
        #[serde(skip_serializing_if = "Option::is_none")]
        price: Option<Amount>,
    },

    /// A certificate was split into parent remainder and child.
    #[serde(rename = "SPLIT", rename_all = "camelCase")]
    Split {
        /// Parent certificate identifier (timeline key).
        cert_id: String,
        /// When the operation occurred, RFC 3339 UTC.
        occurred_at: String,
        /// Proof hash bound to this event, when anchored.
        #[serde(skip_serializing_if = "Option::is_none")]
        proof_hash: Option<String>,
        /// Parent certificate identifier.
        parent_cert_id: String,
        /// Newly created child certificate identifier.
        child_cert_id: String,
        /// Parent owner at split time.
        from: String,
        /// Child owner.
        to: String,
        /// Gram amount moved into the child.
        amount_child_gram: Amount,
    },

    /// A certificate changed lifecycle status.
    #[serde(rename = "STATUS_CHANGED", rename_all = "camelCase")]
    StatusChanged {
        /// Certificate identifier.
        cert_id: String,
        /// When the operation occurred, RFC 3339 UTC.
        occurred_at: String,
        /// Proof hash bound to this event, when anchored.
        #[serde(skip_serializing_if = "Option::is_none")]
        proof_hash: Option<String>,
        /// The new status.
        status: CertificateStatus,
    },
}

impl LedgerEvent {
    /// The certificate this event is keyed under.
    #[must_use]
    pub fn cert_id(&self) -> &str {
        match self {
            Self::Issued { cert_id, .. }
            | Self::Transfer { cert_id, .. }
            | Self::Split { cert_id, .. }
            | Self::StatusChanged { cert_id, .. } => cert_id,
        }
    }

    /// When the underlying operation occurred.
    #[must_use]
    pub fn occurred_at(&self) -> &str {
        match self {
            Self::Issued { occurred_at, .. }
            | Self::Transfer { occurred_at, .. }
            | Self::Split { occurred_at, .. }
            | Self::StatusChanged { occurred_at, .. } => occurred_at,
        }
    }

    /// The wire discriminator, e.g. `TRANSFER`.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Issued { .. } => "ISSUED",
            Self::Transfer { .. } => "TRANSFER",
            Self::Split { .. } => "SPLIT",
            Self::StatusChanged { .. } => "STATUS_CHANGED",
        }
    }

    /// For split events, the child certificate id.
    #[must_use]
    pub fn child_cert_id(&self) -> Option<&str> {
        match self {
            Self::Split { child_cert_id, .. } => Some(child_cert_id),
            _ => None,
        }
    }

    /// Checks variant-specific shape constraints beyond what serde enforces.
    ///
    /// # Errors
    ///
    /// Returns [`EventError`] on empty identifiers or a non-positive split
    /// amount.
    pub fn validate(&self) -> Result<(), EventError> {
        fn non_empty(value: &str, field: &'static str) -> Result<(), EventError> {
            if value.trim().is_empty() {
                Err(EventError::EmptyField { field })
            } else {
                Ok(())
            }
        }

        non_empty(self.cert_id(), "certId")?;
        non_empty(self.occurred_at(), "occurredAt")?;

        match self {
            Self::Issued { owner, purity, .. } => {
                non_empty(owner, "owner")?;
                non_empty(purity, "purity")
            },
            Self::Transfer { from, to, .. } => {
                non_empty(from, "from")?;
                non_empty(to, "to")
            },
            Self::Split {
                parent_cert_id,
                child_cert_id,
                from,
                to,
                amount_child_gram,
                ..
            } => {
                non_empty(parent_cert_id, "parentCertId")?;
                non_empty(child_cert_id, "childCertId")?;
                non_empty(from, "from")?;
                non_empty(to, "to")?;
                if amount_child_gram.is_positive() {
                    Ok(())
                } else {
                    Err(EventError::NonPositiveSplitAmount)
                }
            },
            Self::StatusChanged { .. } => Ok(()),
        }
    }
}

/// A proof anchor binding a payload hash to a moment of anchoring.
///
/// One latest anchor is kept per certificate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProofAnchor {
    /// Certificate identifier.
    pub cert_id: String,
    /// SHA-256 hex of the certificate payload at anchoring time.
    pub payload_hash: String,
    /// Derived anchor hash, see [`ProofAnchor::derive`].
    pub proof_hash: String,
    /// When the anchor was computed, RFC 3339 UTC.
    pub anchored_at: String,
}

impl ProofAnchor {
    /// Derives an anchor for the given payload hash.
    ///
    /// `proofHash = SHA256(canonicalJSON({certId, payloadHash, occurredAt,
    /// anchoredAt}))`. The `occurredAt` participates in the hash but is not
    /// stored on the record.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`](crate::canonical::CanonicalError) when an
    /// input string violates the canonical profile (e.g. non-NFC).
    pub fn derive(
        cert_id: &str,
        payload_hash: &str,
        occurred_at: &str,
        anchored_at: &str,
    ) -> Result<Self, crate::canonical::CanonicalError> {
        let preimage = serde_json::json!({
            "certId": cert_id,
            "payloadHash": payload_hash,
            "occurredAt": occurred_at,
            "anchoredAt": anchored_at,
        });
        let canonical = canonical::canonicalize_value(&preimage)?;
        Ok(Self {
            cert_id: cert_id.to_string(),
            payload_hash: payload_hash.to_string(),
            proof_hash: crypto::sha256_hex(&canonical),
            anchored_at: anchored_at.to_string(),
        })
    }
}
