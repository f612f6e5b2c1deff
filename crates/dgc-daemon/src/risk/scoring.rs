//! Pure risk heuristics.
//!
//! Each function recomputes a target's reasons from its full stored event
//! history, deterministically: the same event set always yields the same
//! profile. Events with unparseable timestamps are excluded from windowed
//! heuristics.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use dgc_core::event::LedgerEvent;
use dgc_core::listing::{ListingAuditEvent, ListingAuditType};
use dgc_core::risk::RiskReason;

/// Window for transfer velocity.
fn velocity_window() -> Duration {
    Duration::hours(24)
}

/// Window for wash-loop pairing.
fn wash_window() -> Duration {
    Duration::hours(48)
}

/// Window for cancellation pressure and actor repeat cancellation.
fn cancel_window() -> Duration {
    Duration::days(7)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn reason(code: &str, impact: u32, message: String, evidence: serde_json::Value) -> RiskReason {
    RiskReason {
        code: code.to_string(),
        score_impact: impact,
        message,
        evidence: Some(evidence),
    }
}

/// Certificate heuristics over the certificate's ledger events and the
/// listing audit events that touch it.
#[must_use]
pub fn certificate_reasons(
    events: &[LedgerEvent],
    cert_audit: &[ListingAuditEvent],
    now: DateTime<Utc>,
) -> Vec<RiskReason> {
    let mut reasons = Vec::new();

    let transfers: Vec<(&LedgerEvent, DateTime<Utc>)> = events
        .iter()
        .filter(|e| matches!(e, LedgerEvent::Transfer { .. }))
        .filter_map(|e| parse_time(e.occurred_at()).map(|t| (e, t)))
        .collect();

    // Transfer velocity: CRITICAL replaces ELEVATED.
    let recent = transfers
        .iter()
        .filter(|(_, t)| now.signed_duration_since(*t) <= velocity_window())
        .count();
    if recent >= 5 {
        reasons.push(reason(
            "TRANSFER_VELOCITY_CRITICAL",
            40,
            format!("{recent} transfers in the last 24h"),
            json!({ "transfers24h": recent }),
        ));
    } else if recent >= 3 {
        reasons.push(reason(
            "TRANSFER_VELOCITY_ELEVATED",
            25,
            format!("{recent} transfers in the last 24h"),
            json!({ "transfers24h": recent }),
        ));
    }

    // Wash loop: two transfers within 48h of each other with reversed
    // counterparties.
    'wash: for (i, (a, ta)) in transfers.iter().enumerate() {
        for (b, tb) in transfers.iter().skip(i + 1) {
            let gap = (*tb - *ta).abs();
            if gap > wash_window() {
                continue;
            }
            if let (
                LedgerEvent::Transfer {
                    from: a_from,
                    to: a_to,
                    ..
                },
                LedgerEvent::Transfer {
                    from: b_from,
                    to: b_to,
                    ..
                },
            ) = (a, b)
            {
                if a_from == b_to && a_to == b_from {
                    reasons.push(reason(
                        "WASH_LOOP_PATTERN",
                        30,
                        format!("ownership loop between {a_from} and {a_to} within 48h"),
                        json!({ "parties": [a_from, a_to] }),
                    ));
                    break 'wash;
                }
            }
        }
    }

    // Cancellation pressure from the marketplace side.
    let cancellations = cert_audit
        .iter()
        .filter(|e| e.event_type == ListingAuditType::Cancelled)
        .filter_map(|e| parse_time(&e.occurred_at))
        .filter(|t| now.signed_duration_since(*t) <= cancel_window())
        .count();
    if cancellations >= 4 {
        reasons.push(reason(
            "CANCELLATION_PRESSURE_CRITICAL",
            35,
            format!("{cancellations} listing cancellations touching this certificate in 7d"),
            json!({ "cancellations7d": cancellations }),
        ));
    } else if cancellations >= 2 {
        reasons.push(reason(
            "CANCELLATION_PRESSURE_ELEVATED",
            20,
            format!("{cancellations} listing cancellations touching this certificate in 7d"),
            json!({ "cancellations7d": cancellations }),
        ));
    }

    reasons
}

/// Listing heuristics over the listing's audit trail.
///
/// `latest_cancel_actor_history` is the full cross-listing CANCELLED history
/// of the actor on the listing's latest CANCELLED event (empty when there is
/// no cancellation or no actor).
#[must_use]
pub fn listing_reasons(
    audit: &[ListingAuditEvent],
    latest_cancel_actor_history: &[ListingAuditEvent],
    now: DateTime<Utc>,
) -> Vec<RiskReason> {
    let mut reasons = Vec::new();

    let locked = audit
        .iter()
        .filter(|e| e.event_type == ListingAuditType::Locked)
        .count();
    let cancelled = audit
        .iter()
        .filter(|e| e.event_type == ListingAuditType::Cancelled)
        .count();

    if locked >= 1 && cancelled >= 1 {
        reasons.push(reason(
            "LOCK_CANCEL_PATTERN",
            35,
            "listing was locked and then cancelled".to_string(),
            json!({ "locked": locked, "cancelled": cancelled }),
        ));
    }
    if locked >= 2 {
        reasons.push(reason(
            "MULTIPLE_LOCK_ATTEMPTS",
            15,
            format!("{locked} lock attempts on this listing"),
            json!({ "locked": locked }),
        ));
    }

    if let Some(latest_cancel) = audit
        .iter()
        .rev()
        .find(|e| e.event_type == ListingAuditType::Cancelled)
    {
        let buyer_timeout = latest_cancel
            .details
            .as_ref()
            .and_then(|d| d.get("reason"))
            .and_then(serde_json::Value::as_str)
            == Some("buyer_timeout");
        if buyer_timeout {
            reasons.push(reason(
                "BUYER_TIMEOUT_SIGNAL",
                10,
                "latest cancellation reports a buyer timeout".to_string(),
                json!({ "eventId": latest_cancel.event_id }),
            ));
        }

        if let Some(actor) = &latest_cancel.actor {
            let actor_recent = latest_cancel_actor_history
                .iter()
                .filter(|e| e.actor.as_deref() == Some(actor.as_str()))
                .filter_map(|e| parse_time(&e.occurred_at))
                .filter(|t| now.signed_duration_since(*t) <= cancel_window())
                .count();
            if actor_recent >= 3 {
                reasons.push(reason(
                    "ACTOR_REPEAT_CANCELLATION",
                    30,
                    format!("actor {actor} cancelled {actor_recent} listings in 7d"),
                    json!({ "actor": actor, "cancellations7d": actor_recent }),
                ));
            }
        }
    }

    reasons
}

/// Score for a reconciliation alert: proportional to
/// `absMismatch / threshold`, capped at 100. A zero threshold maps any
/// mismatch to 100.
#[must_use]
pub fn reconciliation_score(abs_mismatch_scaled: i64, threshold_scaled: i64) -> u32 {
    if abs_mismatch_scaled <= 0 {
        return 0;
    }
    if threshold_scaled <= 0 {
        return 100;
    }
    let ratio = (abs_mismatch_scaled as f64 / threshold_scaled as f64) * 100.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = ratio.round() as u32;
    score.min(100)
}
