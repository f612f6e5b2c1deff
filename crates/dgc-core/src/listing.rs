//! Marketplace listings, escrow state machine, audit events, and
//! idempotency records.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::Amount;

/// Listing lifecycle states.
///
/// Allowed transitions: `OPEN → LOCKED → {SETTLED, CANCELLED}` and
/// `OPEN → CANCELLED`. `SETTLED` and `CANCELLED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    /// Listed and available to lock.
    #[serde(rename = "OPEN")]
    Open,
    /// Escrow locked by a buyer.
    #[serde(rename = "LOCKED")]
    Locked,
    /// Settled; terminal.
    #[serde(rename = "SETTLED")]
    Settled,
    /// Cancelled; terminal.
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl ListingStatus {
    /// Returns true when `self → next` is an allowed transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Open => matches!(next, Self::Locked | Self::Cancelled),
            Self::Locked => matches!(next, Self::Settled | Self::Cancelled),
            Self::Settled | Self::Cancelled => false,
        }
    }

    /// The wire name, e.g. `OPEN`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Locked => "LOCKED",
            Self::Settled => "SETTLED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "OPEN" => Some(Self::Open),
            "LOCKED" => Some(Self::Locked),
            "SETTLED" => Some(Self::Settled),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A marketplace listing with lifecycle stamps and soft dispute flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceListing {
    /// Listing identifier, `LST-` prefixed.
    pub listing_id: String,
    /// The certificate being sold.
    pub cert_id: String,
    /// Seller identifier; must match the certificate owner at creation.
    pub seller: String,
    /// Asking price.
    pub ask_price: Amount,
    /// Current lifecycle status.
    pub status: ListingStatus,
    /// Creation timestamp, RFC 3339 UTC.
    pub created_at: String,
    /// Last mutation timestamp, RFC 3339 UTC.
    pub updated_at: String,
    /// Buyer holding the escrow lock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    /// When escrow was locked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<String>,
    /// When the listing settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<String>,
    /// Final settlement price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_price: Option<Amount>,
    /// When the listing was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    /// Reason supplied at cancellation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    /// True while a dispute is open against this listing.
    #[serde(default)]
    pub under_dispute: bool,
    /// Dispute identifier, once opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<String>,
    /// Dispute status mirror kept on the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_status: Option<String>,
    /// When the dispute was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_opened_at: Option<String>,
    /// When the dispute resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_resolved_at: Option<String>,
}

/// Kinds of listing audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingAuditType {
    /// Listing created.
    #[serde(rename = "CREATED")]
    Created,
    /// Escrow locked.
    #[serde(rename = "LOCKED")]
    Locked,
    /// Escrow settled.
    #[serde(rename = "SETTLED")]
    Settled,
    /// Listing cancelled.
    #[serde(rename = "CANCELLED")]
    Cancelled,
    /// Dispute opened against the listing.
    #[serde(rename = "DISPUTE_OPENED")]
    DisputeOpened,
}

impl ListingAuditType {
    /// The wire name, e.g. `CREATED`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Locked => "LOCKED",
            Self::Settled => "SETTLED",
            Self::Cancelled => "CANCELLED",
            Self::DisputeOpened => "DISPUTE_OPENED",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "CREATED" => Some(Self::Created),
            "LOCKED" => Some(Self::Locked),
            "SETTLED" => Some(Self::Settled),
            "CANCELLED" => Some(Self::Cancelled),
            "DISPUTE_OPENED" => Some(Self::DisputeOpened),
            _ => None,
        }
    }
}

impl fmt::Display for ListingAuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only audit record for a listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingAuditEvent {
    /// Event identifier, `EVT-` prefixed.
    pub event_id: String,
    /// Listing this event belongs to.
    pub listing_id: String,
    /// Kind of state transition.
    #[serde(rename = "type")]
    pub event_type: ListingAuditType,
    /// Acting party, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// When the transition occurred, RFC 3339 UTC.
    pub occurred_at: String,
    /// Free-form details (e.g. `{"reason": "buyer_timeout"}`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// A stored idempotency outcome, unique on `(action, key)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyRecord {
    /// Mutation kind, e.g. `escrow.lock`.
    pub action: String,
    /// Caller-supplied idempotency key.
    pub key: String,
    /// SHA-256 hex of the canonical JSON of the parsed request body.
    pub request_hash: String,
    /// HTTP status of the first successful response.
    pub response_status: u16,
    /// Exact body of the first successful response.
    pub response_body: String,
    /// When the record was stored, RFC 3339 UTC.
    pub created_at: String,
}
