//! HTTP surface of the risk engine.
//!
//! Ingest endpoints append to the event logs, recompute the affected
//! target's profile from its full stored history, and emit edge-triggered
//! alerts: an alert fires only when a score crosses the threshold upward
//! from below (or from no profile at all).
//!
//! The append-recompute-upsert sequence runs under a single ingest lock so
//! concurrent ingests for the same target cannot interleave and profiles
//! stay monotonically consistent.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use dgc_core::amount::Amount;
use dgc_core::event::LedgerEvent;
use dgc_core::listing::ListingAuditEvent;
use dgc_core::risk::{RiskAlert, RiskLevel, RiskProfile, RiskReason, RiskTargetType};

use crate::clients::{spawn_fanout, HttpClient};
use crate::config::RiskConfig;
use crate::http::{decode_body, health_body, new_id, now_iso, parse_limit, ApiError};

use super::scoring::{certificate_reasons, listing_reasons, reconciliation_score};
use super::store::{RiskStore, StoreError};

/// Shared state of the risk engine.
#[derive(Debug)]
pub struct RiskState {
    /// Event logs, profiles, and alerts.
    pub store: RiskStore,
    /// Outbound HTTP client for the alert webhook.
    pub http: HttpClient,
    /// Score at and above which alerts fire.
    pub alert_threshold: u32,
    /// Webhook notified on each new alert, when configured.
    pub webhook_url: Option<String>,
    /// Serializes append-recompute-upsert sequences.
    ingest_lock: std::sync::Mutex<()>,
}

impl RiskState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store or HTTP client fails to
    /// initialize.
    pub fn from_config(config: &RiskConfig) -> Result<Self, StoreError> {
        let store = RiskStore::open(&config.db_path)?;
        Self::new(store, config.alert_threshold, config.alert_webhook_url.clone())
    }

    /// Builds state from parts; tests use this with an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the HTTP client fails to build.
    pub fn new(
        store: RiskStore,
        alert_threshold: u32,
        webhook_url: Option<String>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            store,
            http: HttpClient::new(None).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            alert_threshold,
            webhook_url,
            ingest_lock: std::sync::Mutex::new(()),
        })
    }
}

/// Builds the risk engine router.
pub fn router(state: Arc<RiskState>) -> Router {
    Router::new()
        .route("/ingest/ledger-event", post(ingest_ledger_event))
        .route("/ingest/listing-audit-event", post(ingest_listing_audit))
        .route("/ingest/reconciliation-alert", post(ingest_recon_alert))
        .route("/risk/certificates/:id", get(certificate_profile))
        .route("/risk/listings/:id", get(listing_profile))
        .route("/risk/summary", get(summary))
        .route("/risk/alerts", get(alerts))
        .route("/health", get(health))
        .with_state(state)
}

fn store_err(e: StoreError) -> ApiError {
    ApiError::internal(e.to_string())
}

/// Recomputes a certificate profile from stored history and emits an alert
/// on an upward threshold crossing. Caller holds the ingest lock.
fn recompute_certificate(
    state: &RiskState,
    cert_id: &str,
) -> Result<(RiskProfile, Option<RiskAlert>), StoreError> {
    let events = state.store.ledger_events_for(cert_id)?;
    let cert_audit = state.store.audit_for_cert(cert_id)?;
    let reasons = certificate_reasons(&events, &cert_audit, chrono::Utc::now());
    let profile = RiskProfile::from_reasons(cert_id.to_string(), reasons, now_iso(), None);

    let previous = state
        .store
        .get_profile(cert_id, RiskTargetType::Certificate)?
        .map(|p| p.score);
    state
        .store
        .upsert_profile(&profile, RiskTargetType::Certificate)?;
    let alert = decide_alert(state, previous, &profile, RiskTargetType::Certificate)?;
    Ok((profile, alert))
}

/// Recomputes a listing profile from its audit trail. Caller holds the
/// ingest lock.
fn recompute_listing(
    state: &RiskState,
    listing_id: &str,
    cert_id: Option<&str>,
) -> Result<(RiskProfile, Option<RiskAlert>), StoreError> {
    let trail = state.store.audit_for_listing(listing_id)?;
    let actor_history = trail
        .iter()
        .rev()
        .find(|e| e.event_type == dgc_core::listing::ListingAuditType::Cancelled)
        .and_then(|e| e.actor.clone())
        .map(|actor| state.store.cancellations_by_actor(&actor))
        .transpose()?
        .unwrap_or_default();

    let reasons = listing_reasons(&trail, &actor_history, chrono::Utc::now());
    let profile = RiskProfile::from_reasons(
        listing_id.to_string(),
        reasons,
        now_iso(),
        cert_id.map(String::from),
    );

    let previous = state
        .store
        .get_profile(listing_id, RiskTargetType::Listing)?
        .map(|p| p.score);
    state
        .store
        .upsert_profile(&profile, RiskTargetType::Listing)?;
    let alert = decide_alert(state, previous, &profile, RiskTargetType::Listing)?;
    Ok((profile, alert))
}

/// Edge-triggered alerting: fire only when the score crosses the threshold
/// upward from below (or from no previous profile).
fn decide_alert(
    state: &RiskState,
    previous_score: Option<u32>,
    profile: &RiskProfile,
    target_type: RiskTargetType,
) -> Result<Option<RiskAlert>, StoreError> {
    let crossed_up = profile.score >= state.alert_threshold
        && previous_score.map_or(true, |p| p < state.alert_threshold);
    if !crossed_up {
        return Ok(None);
    }
    let alert = RiskAlert {
        alert_id: new_id("ALERT"),
        target_type,
        target_id: profile.target.clone(),
        score: profile.score,
        level: profile.level,
        reasons: profile.reasons.clone(),
        created_at: now_iso(),
    };
    state.store.insert_alert(&alert)?;
    info!(
        target = %alert.target_id,
        score = alert.score,
        "risk alert emitted"
    );
    Ok(Some(alert))
}

fn notify_webhook(state: &RiskState, alert: &RiskAlert) {
    let Some(url) = &state.webhook_url else {
        return;
    };
    if let Ok(body) = serde_json::to_value(alert) {
        spawn_fanout(state.http.clone(), url.clone(), body, "risk alert webhook");
    }
}

async fn ingest_ledger_event(
    State(state): State<Arc<RiskState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let event: LedgerEvent = decode_body(&body)?;
    event
        .validate()
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;

    let (profile, alert) = {
        let _guard = state
            .ingest_lock
            .lock()
            .map_err(|_| ApiError::internal("ingest lock poisoned"))?;
        state.store.append_ledger_event(&event).map_err(store_err)?;
        recompute_certificate(&state, event.cert_id()).map_err(store_err)?
    };
    if let Some(alert) = &alert {
        notify_webhook(&state, alert);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "profile": profile })),
    ))
}

#[derive(Debug, Deserialize)]
struct ListingAuditIngest {
    event: ListingAuditEvent,
    listing: Option<Value>,
}

async fn ingest_listing_audit(
    State(state): State<Arc<RiskState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let ingest: ListingAuditIngest = decode_body(&body)?;
    if ingest.event.listing_id.trim().is_empty() {
        return Err(ApiError::invalid_request("listingId must not be empty"));
    }
    let cert_id = ingest
        .listing
        .as_ref()
        .and_then(|l| l.get("certId"))
        .and_then(Value::as_str)
        .map(String::from);

    let (listing_profile, alerts) = {
        let _guard = state
            .ingest_lock
            .lock()
            .map_err(|_| ApiError::internal("ingest lock poisoned"))?;
        state
            .store
            .append_listing_audit(&ingest.event, cert_id.as_deref())
            .map_err(store_err)?;

        let (listing_profile, listing_alert) =
            recompute_listing(&state, &ingest.event.listing_id, cert_id.as_deref())
                .map_err(store_err)?;

        // Listing cancellations feed the owning certificate's heuristics.
        let cert_alert = match &cert_id {
            Some(cert_id) => recompute_certificate(&state, cert_id).map_err(store_err)?.1,
            None => None,
        };
        let alerts: Vec<RiskAlert> =
            [listing_alert, cert_alert].into_iter().flatten().collect();
        (listing_profile, alerts)
    };
    for alert in &alerts {
        notify_webhook(&state, alert);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "profile": listing_profile })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconAlertIngest {
    run_id: String,
    abs_mismatch_gram: String,
    threshold_gram: String,
}

async fn ingest_recon_alert(
    State(state): State<Arc<RiskState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let ingest: ReconAlertIngest = decode_body(&body)?;
    let abs_mismatch = Amount::parse(&ingest.abs_mismatch_gram)
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let threshold = Amount::parse(&ingest.threshold_gram)
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;

    let score = reconciliation_score(abs_mismatch.scaled(), threshold.scaled());
    let alert = RiskAlert {
        alert_id: format!("ALERT-RECON-{}", ingest.run_id),
        target_type: RiskTargetType::Reconciliation,
        target_id: ingest.run_id.clone(),
        score,
        level: RiskLevel::from_score(score),
        reasons: vec![RiskReason {
            code: "CUSTODY_MISMATCH".to_string(),
            score_impact: score,
            message: format!(
                "custody mismatch of {abs_mismatch}g against threshold {threshold}g"
            ),
            evidence: Some(json!({ "runId": ingest.run_id })),
        }],
        created_at: now_iso(),
    };
    state.store.insert_alert(&alert).map_err(store_err)?;
    info!(run_id = %alert.target_id, score, "reconciliation alert stored");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "alert": alert })),
    ))
}

async fn certificate_profile(
    State(state): State<Arc<RiskState>>,
    Path(cert_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let profile = state
        .store
        .get_profile(&cert_id, RiskTargetType::Certificate)
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found("risk_profile_not_found"))?;
    Ok(Json(serde_json::to_value(profile).map_err(|e| ApiError::internal(e.to_string()))?))
}

async fn listing_profile(
    State(state): State<Arc<RiskState>>,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let profile = state
        .store
        .get_profile(&listing_id, RiskTargetType::Listing)
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found("risk_profile_not_found"))?;
    Ok(Json(serde_json::to_value(profile).map_err(|e| ApiError::internal(e.to_string()))?))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

async fn summary(
    State(state): State<Arc<RiskState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), 20, 100)?;
    let certificates = state
        .store
        .top_profiles(RiskTargetType::Certificate, limit)
        .map_err(store_err)?;
    let listings = state
        .store
        .top_profiles(RiskTargetType::Listing, limit)
        .map_err(store_err)?;
    Ok(Json(json!({ "certificates": certificates, "listings": listings })))
}

async fn alerts(
    State(state): State<Arc<RiskState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), 20, 100)?;
    let alerts = state.store.alerts(limit).map_err(store_err)?;
    Ok(Json(json!({ "alerts": alerts })))
}

async fn health() -> Json<Value> {
    Json(health_body("risk-engine"))
}
