//! Reconciliation runs, the freeze singleton, and governance overrides.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;

/// One custody-vs-claims reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRun {
    /// Run identifier, `RUN-` prefixed.
    pub run_id: String,
    /// When the run executed, RFC 3339 UTC.
    pub created_at: String,
    /// Custody inventory total.
    pub custody_total_gram: Amount,
    /// Sum of ACTIVE and LOCKED certificate amounts.
    pub outstanding_total_gram: Amount,
    /// `outstanding - custody`, may be negative on the scaled integer.
    pub mismatch_gram: String,
    /// Absolute mismatch.
    pub abs_mismatch_gram: Amount,
    /// Threshold in effect for this run.
    pub threshold_gram: Amount,
    /// True when `abs_mismatch >= threshold`.
    pub freeze_triggered: bool,
    /// Total certificates returned by the authority.
    pub certificates_evaluated: u64,
    /// Certificates in ACTIVE.
    pub active_certificates: u64,
    /// Certificates in LOCKED.
    pub locked_certificates: u64,
}

/// The process-wide marketplace freeze flag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FreezeState {
    /// True while marketplace writes are gated.
    pub active: bool,
    /// Why the flag is in its current position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Last flip time, RFC 3339 UTC.
    pub updated_at: String,
    /// The run that last touched the flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<String>,
}

/// An audited manual unfreeze.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FreezeOverride {
    /// Override identifier, `OVR-` prefixed.
    pub override_id: String,
    /// Always `UNFREEZE`.
    pub action: String,
    /// Governance actor performing the override.
    pub actor: String,
    /// Stated reason.
    pub reason: String,
    /// Freeze flag before the override.
    pub previous_active: bool,
    /// Freeze flag after the override.
    pub next_active: bool,
    /// When the override happened, RFC 3339 UTC.
    pub created_at: String,
    /// The run that originally triggered the freeze, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Formats a possibly negative scaled mismatch as a signed canonical amount.
#[must_use]
pub fn format_signed_scaled(scaled: i64) -> String {
    if scaled < 0 {
        format!("-{}", Amount::from_scaled(scaled.saturating_abs()))
    } else {
        Amount::from_scaled(scaled).to_string()
    }
}
