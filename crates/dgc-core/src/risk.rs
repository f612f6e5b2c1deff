//! Risk profiles, reasons, levels, and alerts.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Score band: `HIGH >= 60`, `MEDIUM >= 25`, else `LOW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score below 25.
    #[serde(rename = "LOW")]
    Low,
    /// Score in `[25, 60)`.
    #[serde(rename = "MEDIUM")]
    Medium,
    /// Score of 60 or above.
    #[serde(rename = "HIGH")]
    High,
}

impl RiskLevel {
    /// Maps a clamped score to its band.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        if score >= 60 {
            Self::High
        } else if score >= 25 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// The wire name, e.g. `HIGH`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a risk alert points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskTargetType {
    /// A certificate profile crossed the threshold.
    #[serde(rename = "CERTIFICATE")]
    Certificate,
    /// A listing profile crossed the threshold.
    #[serde(rename = "LISTING")]
    Listing,
    /// A reconciliation run breached its mismatch threshold.
    #[serde(rename = "RECONCILIATION")]
    Reconciliation,
}

impl RiskTargetType {
    /// The wire name, e.g. `CERTIFICATE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Certificate => "CERTIFICATE",
            Self::Listing => "LISTING",
            Self::Reconciliation => "RECONCILIATION",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "CERTIFICATE" => Some(Self::Certificate),
            "LISTING" => Some(Self::Listing),
            "RECONCILIATION" => Some(Self::Reconciliation),
            _ => None,
        }
    }
}

/// One additive contribution to a risk score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskReason {
    /// Stable heuristic code, e.g. `WASH_LOOP_PATTERN`.
    pub code: String,
    /// Additive contribution to the score.
    pub score_impact: u32,
    /// Human-readable summary.
    pub message: String,
    /// Supporting evidence for the heuristic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
}

/// A recomputed per-target risk profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    /// Target identifier (certificate or listing id).
    pub target: String,
    /// Clamped score in `[0, 100]`.
    pub score: u32,
    /// Band derived from the score.
    pub level: RiskLevel,
    /// The contributing heuristics.
    pub reasons: Vec<RiskReason>,
    /// Last recompute time, RFC 3339 UTC.
    pub updated_at: String,
    /// For listing profiles, the certificate behind the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_id: Option<String>,
}

impl RiskProfile {
    /// Builds a profile from reasons, clamping the summed impact to 100.
    #[must_use]
    pub fn from_reasons(
        target: String,
        reasons: Vec<RiskReason>,
        updated_at: String,
        cert_id: Option<String>,
    ) -> Self {
        let score = reasons
            .iter()
            .map(|r| r.score_impact)
            .sum::<u32>()
            .min(100);
        Self {
            target,
            score,
            level: RiskLevel::from_score(score),
            reasons,
            updated_at,
            cert_id,
        }
    }
}

/// A persisted alert for a threshold crossing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskAlert {
    /// Alert identifier.
    pub alert_id: String,
    /// Kind of target.
    pub target_type: RiskTargetType,
    /// Target identifier.
    pub target_id: String,
    /// Score at alert time.
    pub score: u32,
    /// Band at alert time.
    pub level: RiskLevel,
    /// Reasons captured at alert time.
    pub reasons: Vec<RiskReason>,
    /// When the alert was persisted, RFC 3339 UTC.
    pub created_at: String,
}
