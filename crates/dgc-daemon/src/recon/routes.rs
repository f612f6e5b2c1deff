//! HTTP surface of the reconciliation and freeze controller.
//!
//! A run pulls the certificate inventory from the authority, totals
//! outstanding claims over ACTIVE and LOCKED certificates on scaled
//! integers, and flips the freeze singleton when the absolute mismatch
//! reaches the threshold. Manual unfreeze is governance-gated and leaves an
//! append-only override record.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use dgc_core::amount::Amount;
use dgc_core::recon::{format_signed_scaled, FreezeOverride, FreezeState, ReconciliationRun};
use dgc_core::trust::RoleSet;

use crate::auth::{require_governance, ServiceAuth};
use crate::clients::{spawn_fanout, HttpClient, PRIMARY_DEADLINE};
use crate::config::ReconConfig;
use crate::http::{decode_body, health_body, new_id, now_iso, parse_limit, ApiError};

use super::store::{ReconStore, StoreError};

/// Hard cap on history page size.
const HISTORY_CAP: usize = 100;

/// Shared state of the reconciliation controller.
#[derive(Debug)]
pub struct ReconState {
    /// Runs, freeze singleton, and overrides.
    pub store: ReconStore,
    /// Service-token gate for write endpoints.
    pub auth: ServiceAuth,
    /// Outbound HTTP client.
    pub http: HttpClient,
    /// Certificate authority base URL.
    pub certificate_url: Option<String>,
    /// Risk engine base URL for reconciliation alerts.
    pub risk_url: Option<String>,
    /// Default custody inventory.
    pub custody_default: Amount,
    /// Mismatch threshold.
    pub threshold: Amount,
    /// Roles allowed to unfreeze.
    pub unfreeze_roles: RoleSet,
}

impl ReconState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store or HTTP client fails to
    /// initialize.
    pub fn from_config(config: &ReconConfig) -> Result<Self, StoreError> {
        let store = ReconStore::open(&config.db_path)?;
        let http = HttpClient::new(config.common.service_token.clone())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            store,
            auth: ServiceAuth::new(config.common.service_token.clone()),
            http,
            certificate_url: config.certificate_service_url.clone(),
            risk_url: config.risk_stream_url.clone(),
            custody_default: config.custody_total_gram,
            threshold: config.mismatch_threshold_gram,
            unfreeze_roles: config.unfreeze_roles.clone(),
        })
    }

    /// The freeze singleton, defaulting to inactive before the first run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    pub fn freeze_state(&self) -> Result<FreezeState, StoreError> {
        Ok(self.store.freeze_state()?.unwrap_or(FreezeState {
            active: false,
            reason: None,
            updated_at: now_iso(),
            last_run_id: None,
        }))
    }
}

/// Builds the reconciliation router.
pub fn router(state: Arc<ReconState>) -> Router {
    Router::new()
        .route("/reconcile/run", post(run_reconciliation))
        .route("/reconcile/latest", get(latest))
        .route("/reconcile/history", get(history))
        .route("/freeze/unfreeze", post(unfreeze))
        .route("/freeze/overrides", get(overrides))
        .route("/health", get(health))
        .with_state(state)
}

fn store_err(e: StoreError) -> ApiError {
    ApiError::internal(e.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    inventory_total_gram: Option<String>,
}

async fn run_reconciliation(
    State(state): State<Arc<ReconState>>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: RunRequest = match body {
        Some(Json(value)) => decode_body(&value)?,
        None => RunRequest {
            inventory_total_gram: None,
        },
    };
    let custody = match &request.inventory_total_gram {
        Some(raw) => Amount::parse(raw)
            .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))?,
        None => state.custody_default,
    };

    let inventory = fetch_inventory(&state).await?;

    let mut outstanding_scaled: i64 = 0;
    let mut active_certificates: u64 = 0;
    let mut locked_certificates: u64 = 0;
    for cert in &inventory {
        match cert.status.as_str() {
            "ACTIVE" => {
                active_certificates += 1;
                outstanding_scaled = outstanding_scaled.saturating_add(cert.amount.scaled());
            },
            "LOCKED" => {
                locked_certificates += 1;
                outstanding_scaled = outstanding_scaled.saturating_add(cert.amount.scaled());
            },
            _ => {},
        }
    }

    let mismatch_scaled = outstanding_scaled - custody.scaled();
    let abs_scaled = mismatch_scaled.saturating_abs();
    let freeze_triggered = abs_scaled >= state.threshold.scaled();

    let now = now_iso();
    let run = ReconciliationRun {
        run_id: new_id("RUN"),
        created_at: now.clone(),
        custody_total_gram: custody,
        outstanding_total_gram: Amount::from_scaled(outstanding_scaled),
        mismatch_gram: format_signed_scaled(mismatch_scaled),
        abs_mismatch_gram: Amount::from_scaled(abs_scaled),
        threshold_gram: state.threshold,
        freeze_triggered,
        certificates_evaluated: inventory.len() as u64,
        active_certificates,
        locked_certificates,
    };

    let freeze = if freeze_triggered {
        FreezeState {
            active: true,
            reason: Some(format!(
                "Mismatch {}g exceeded threshold {}g",
                run.abs_mismatch_gram, run.threshold_gram
            )),
            updated_at: now,
            last_run_id: Some(run.run_id.clone()),
        }
    } else {
        FreezeState {
            active: false,
            reason: None,
            updated_at: now,
            last_run_id: Some(run.run_id.clone()),
        }
    };

    state.store.insert_run(&run, &freeze).map_err(store_err)?;
    info!(
        run_id = %run.run_id,
        outstanding = %run.outstanding_total_gram,
        mismatch = %run.mismatch_gram,
        freeze_triggered,
        "reconciliation run complete"
    );

    if freeze_triggered {
        if let Some(risk_url) = &state.risk_url {
            let url = format!(
                "{}/ingest/reconciliation-alert",
                risk_url.trim_end_matches('/')
            );
            if let Ok(body) = serde_json::to_value(&run) {
                spawn_fanout(state.http.clone(), url, body, "reconciliation alert");
            }
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({ "run": run, "freezeState": freeze })),
    ))
}

async fn latest(State(state): State<Arc<ReconState>>) -> Result<Json<Value>, ApiError> {
    let run = state.store.latest_run().map_err(store_err)?;
    let freeze = state.freeze_state().map_err(store_err)?;
    Ok(Json(json!({ "run": run, "freezeState": freeze })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<String>,
}

async fn history(
    State(state): State<Arc<ReconState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), HISTORY_CAP, HISTORY_CAP)?;
    let runs = state.store.runs(limit).map_err(store_err)?;
    Ok(Json(json!({ "runs": runs })))
}

#[derive(Debug, Deserialize)]
struct UnfreezeRequest {
    actor: String,
    reason: String,
}

async fn unfreeze(
    State(state): State<Arc<ReconState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: UnfreezeRequest = decode_body(&body)?;
    require_governance(&headers, &state.unfreeze_roles, Some(&request.actor))?;
    if request.actor.trim().is_empty() || request.reason.trim().is_empty() {
        return Err(ApiError::invalid_request("actor and reason are required"));
    }

    let current = state.freeze_state().map_err(store_err)?;
    if !current.active {
        return Err(ApiError::conflict("freeze_not_active")
            .with_message("the marketplace is not frozen"));
    }

    let now = now_iso();
    let unfrozen = FreezeState {
        active: false,
        reason: Some(format!(
            "Manual unfreeze by {}: {}",
            request.actor, request.reason
        )),
        updated_at: now.clone(),
        last_run_id: current.last_run_id.clone(),
    };
    let override_record = FreezeOverride {
        override_id: new_id("OVR"),
        action: "UNFREEZE".to_string(),
        actor: request.actor.clone(),
        reason: request.reason,
        previous_active: true,
        next_active: false,
        created_at: now,
        run_id: current.last_run_id,
    };
    state
        .store
        .apply_override(&unfrozen, &override_record)
        .map_err(store_err)?;

    info!(actor = %request.actor, "manual unfreeze applied");
    Ok(Json(json!({
        "freezeState": unfrozen,
        "override": override_record,
    })))
}

async fn overrides(
    State(state): State<Arc<ReconState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(query.limit.as_deref(), 20, HISTORY_CAP)?;
    let overrides = state.store.overrides(limit).map_err(store_err)?;
    Ok(Json(json!({ "overrides": overrides })))
}

async fn health() -> Json<Value> {
    Json(health_body("reconciliation"))
}

/// A certificate row as reconciliation needs it: status and amount.
struct InventoryRow {
    status: String,
    amount: Amount,
}

async fn fetch_inventory(state: &ReconState) -> Result<Vec<InventoryRow>, ApiError> {
    let Some(base) = &state.certificate_url else {
        return Err(ApiError::bad_gateway("certificate_service_unavailable")
            .with_message("CERTIFICATE_SERVICE_URL is not configured"));
    };
    let url = format!("{}/certificates", base.trim_end_matches('/'));
    let response = state
        .http
        .get_json(&url, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::bad_gateway("certificate_service_unavailable").with_message(e.to_string())
        })?;
    if !response.is_success() {
        return Err(ApiError::bad_gateway("certificate_service_unavailable")
            .with_downstream_status(response.status.as_u16()));
    }

    let certificates = response
        .body
        .get("certificates")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))?;

    let mut rows = Vec::with_capacity(certificates.len());
    for cert in certificates {
        let payload = cert
            .get("payload")
            .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))?;
        let status = payload
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))?;
        let amount_raw = payload
            .get("amountGram")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))?;
        let amount = Amount::parse(amount_raw).map_err(|_| {
            ApiError::bad_gateway("certificate_service_invalid_response")
                .with_message(format!("malformed amountGram '{amount_raw}'"))
        })?;
        rows.push(InventoryRow {
            status: status.to_string(),
            amount,
        });
    }
    Ok(rows)
}
