//! Dispute records and their lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dispute lifecycle: `OPEN → ASSIGNED → RESOLVED`; `RESOLVED` is terminal.
/// Assigning an already-assigned dispute re-assigns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    /// Awaiting triage.
    #[serde(rename = "OPEN")]
    Open,
    /// Assigned to an adjudicator.
    #[serde(rename = "ASSIGNED")]
    Assigned,
    /// Closed with a resolution; terminal.
    #[serde(rename = "RESOLVED")]
    Resolved,
}

impl DisputeStatus {
    /// The wire name, e.g. `OPEN`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Assigned => "ASSIGNED",
            Self::Resolved => "RESOLVED",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "OPEN" => Some(Self::Open),
            "ASSIGNED" => Some(Self::Assigned),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Possible outcomes of a resolved dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeResolution {
    /// Refund the buyer.
    #[serde(rename = "REFUND_BUYER")]
    RefundBuyer,
    /// Release funds to the seller.
    #[serde(rename = "RELEASE_SELLER")]
    ReleaseSeller,
    /// Escalate to manual review.
    #[serde(rename = "MANUAL_REVIEW")]
    ManualReview,
}

/// A dispute over a settled listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRecord {
    /// Dispute identifier, `DSP-` prefixed.
    pub dispute_id: String,
    /// The disputed listing.
    pub listing_id: String,
    /// The certificate behind the listing.
    pub cert_id: String,
    /// Lifecycle status.
    pub status: DisputeStatus,
    /// Party that opened the dispute.
    pub opened_by: String,
    /// Why the dispute was opened.
    pub reason: String,
    /// Optional supporting evidence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
    /// When the dispute was opened, RFC 3339 UTC.
    pub opened_at: String,
    /// Current assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// When last assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<String>,
    /// Who resolved the dispute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// When resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    /// The resolution applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<DisputeResolution>,
    /// Free-form resolution notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}
