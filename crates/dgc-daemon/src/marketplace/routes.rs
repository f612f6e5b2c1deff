//! HTTP surface of the marketplace escrow engine.
//!
//! Escrow mutations (lock, settle, cancel) require an `idempotency-key`
//! header. Replays with the same parsed body return the exact bytes of the
//! first successful response; replays with a differing body conflict.
//! Create, lock, and settle consult the reconciliation freeze gate; cancel
//! does not, so frozen escrows can still unwind.
//!
//! Settlement is a saga: unlock the certificate, transfer it, and on a
//! failed transfer roll the certificate back to LOCKED best-effort while
//! surfacing the transfer error unchanged.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use dgc_core::amount::Amount;
use dgc_core::canonical;
use dgc_core::crypto::sha256_hex;
use dgc_core::listing::{
    IdempotencyRecord, ListingAuditEvent, ListingAuditType, ListingStatus, MarketplaceListing,
};

use crate::auth::ServiceAuth;
use crate::clients::{spawn_fanout, HttpClient, PRIMARY_DEADLINE};
use crate::config::MarketplaceConfig;
use crate::http::{decode_body, health_body, new_id, now_iso, ApiError};

use super::store::{MarketplaceStore, StoreError};

/// Header carrying the caller-supplied idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Shared state of the marketplace engine.
#[derive(Debug)]
pub struct MarketplaceState {
    /// Listings, audit, and idempotency store.
    pub store: MarketplaceStore,
    /// Service-token gate for write endpoints.
    pub auth: ServiceAuth,
    /// Outbound HTTP client.
    pub http: HttpClient,
    /// Certificate authority base URL.
    pub certificate_url: Option<String>,
    /// Reconciliation base URL; the freeze gate is skipped without it.
    pub recon_url: Option<String>,
    /// Risk engine base URL for audit fan-out.
    pub risk_url: Option<String>,
    /// Dispute service base URL.
    pub dispute_url: Option<String>,
}

impl MarketplaceState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] or the HTTP client builder error, stringified.
    pub fn from_config(config: &MarketplaceConfig) -> Result<Self, StoreError> {
        let store = MarketplaceStore::open(&config.db_path)?;
        let http = HttpClient::new(config.common.service_token.clone())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            store,
            auth: ServiceAuth::new(config.common.service_token.clone()),
            http,
            certificate_url: config.certificate_service_url.clone(),
            recon_url: config.reconciliation_service_url.clone(),
            risk_url: config.risk_stream_url.clone(),
            dispute_url: config.dispute_service_url.clone(),
        })
    }
}

/// Builds the marketplace router.
pub fn router(state: Arc<MarketplaceState>) -> Router {
    Router::new()
        .route("/listings/create", post(create_listing))
        .route("/listings", get(list_listings))
        .route("/listings/:id", get(get_listing))
        .route("/listings/:id/audit", get(listing_audit))
        .route("/listings/:id/dispute/open", post(open_dispute))
        .route("/escrow/lock", post(lock_escrow))
        .route("/escrow/settle", post(settle_escrow))
        .route("/escrow/cancel", post(cancel_escrow))
        .route("/health", get(health))
        .with_state(state)
}

fn store_err(e: StoreError) -> ApiError {
    ApiError::internal(e.to_string())
}

// ---------------------------------------------------------------------------
// Idempotency protocol
// ---------------------------------------------------------------------------

enum IdemGate {
    /// First sighting: execute and store under this request hash.
    Execute { request_hash: String },
    /// Same key, same body: replay the stored response.
    Replay { status: u16, body: String },
}

fn idempotency_key(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            ApiError::bad_request("missing_idempotency_key")
                .with_message("idempotency-key header is required")
        })
}

/// The idempotency hash covers the canonical JSON of the *parsed* body, so
/// whitespace and key-order variations collapse to the same hash.
fn request_hash_of(body: &Value) -> Result<String, ApiError> {
    let canonical = canonical::canonicalize_value(body)
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    Ok(sha256_hex(&canonical))
}

fn idempotency_begin(
    state: &MarketplaceState,
    action: &str,
    key: &str,
    body: &Value,
) -> Result<IdemGate, ApiError> {
    let request_hash = request_hash_of(body)?;
    match state.store.idempotency_lookup(action, key).map_err(store_err)? {
        None => Ok(IdemGate::Execute { request_hash }),
        Some(record) if record.request_hash == request_hash => Ok(IdemGate::Replay {
            status: record.response_status,
            body: record.response_body,
        }),
        Some(_) => Err(ApiError::conflict("idempotency_key_reuse_conflict")
            .with_message(format!("idempotency key '{key}' was used with a different body"))),
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn replay_response(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    json_response(status, body)
}

// ---------------------------------------------------------------------------
// Collaborator hops
// ---------------------------------------------------------------------------

fn certificate_base(state: &MarketplaceState) -> Result<&str, ApiError> {
    state
        .certificate_url
        .as_deref()
        .map(|u| u.trim_end_matches('/'))
        .ok_or_else(|| ApiError::unavailable("certificate_service_not_configured"))
}

async fn fetch_certificate(state: &MarketplaceState, cert_id: &str) -> Result<Value, ApiError> {
    let base = certificate_base(state)?;
    let url = format!("{base}/certificates/{cert_id}");
    let response = state
        .http
        .get_json(&url, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::unavailable("certificate_service_unreachable").with_message(e.to_string())
        })?;
    if response.status == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("certificate_not_found"));
    }
    if !response.is_success() {
        return Err(ApiError::bad_gateway("certificate_service_error")
            .with_downstream_status(response.status.as_u16()));
    }
    response
        .body
        .get("certificate")
        .cloned()
        .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))
}

/// Requests a certificate status transition from the authority, mapping
/// 404 to 404, 409 to 409, and anything else to 502.
async fn request_status_transition(
    state: &MarketplaceState,
    cert_id: &str,
    status: &str,
) -> Result<(), ApiError> {
    let base = certificate_base(state)?;
    let url = format!("{base}/certificates/status");
    let body = json!({ "certId": cert_id, "status": status });
    let response = state
        .http
        .post_json(&url, &body, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::bad_gateway("certificate_service_unreachable").with_message(e.to_string())
        })?;
    if response.is_success() {
        return Ok(());
    }
    let downstream_message = response
        .body
        .get("message")
        .and_then(Value::as_str)
        .map(String::from);
    let error = match response.status.as_u16() {
        404 => ApiError::not_found("certificate_not_found"),
        409 => ApiError::conflict("state_conflict"),
        other => {
            return Err(ApiError::bad_gateway("certificate_service_error")
                .with_downstream_status(other))
        },
    };
    Err(match downstream_message {
        Some(message) => error.with_message(message),
        None => error,
    })
}

async fn request_transfer(
    state: &MarketplaceState,
    cert_id: &str,
    to_owner: &str,
    price: Amount,
) -> Result<Value, ApiError> {
    let base = certificate_base(state)?;
    let url = format!("{base}/certificates/transfer");
    let body = json!({
        "certId": cert_id,
        "toOwner": to_owner,
        "price": price.to_string(),
    });
    let response = state
        .http
        .post_json(&url, &body, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::bad_gateway("certificate_service_unreachable").with_message(e.to_string())
        })?;
    if response.is_success() {
        return Ok(response.body);
    }
    let error = match response.status.as_u16() {
        404 => ApiError::not_found("certificate_not_found"),
        409 => ApiError::conflict("state_conflict"),
        other => ApiError::bad_gateway("certificate_service_error").with_downstream_status(other),
    };
    let error = match response.body.get("message").and_then(Value::as_str) {
        Some(message) => error.with_message(message),
        None => error,
    };
    Err(error)
}

/// The freeze gate: applied to create, lock, and settle. Cancel skips it so
/// frozen escrows can unwind.
async fn freeze_gate(state: &MarketplaceState) -> Result<(), ApiError> {
    let Some(base) = &state.recon_url else {
        return Ok(());
    };
    let url = format!("{}/reconcile/latest", base.trim_end_matches('/'));
    let response = state
        .http
        .get_json(&url, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::unavailable("reconciliation_service_unreachable").with_message(e.to_string())
        })?;
    if !response.is_success() {
        return Err(ApiError::bad_gateway("reconciliation_service_error")
            .with_downstream_status(response.status.as_u16()));
    }
    let freeze_state = response.body.get("freezeState").cloned().ok_or_else(|| {
        ApiError::bad_gateway("reconciliation_service_invalid_response")
            .with_message("missing freezeState")
    })?;
    let active = freeze_state.get("active").and_then(Value::as_bool).ok_or_else(|| {
        ApiError::bad_gateway("reconciliation_service_invalid_response")
            .with_message("freezeState.active must be a boolean")
    })?;
    if active {
        return Err(ApiError::new(StatusCode::LOCKED, "marketplace_frozen")
            .with_message("marketplace writes are frozen pending reconciliation")
            .with_freeze_state(freeze_state));
    }
    Ok(())
}

fn fan_audit(state: &MarketplaceState, event: &ListingAuditEvent, listing: &MarketplaceListing) {
    let Some(base) = &state.risk_url else {
        return;
    };
    let url = format!("{}/ingest/listing-audit-event", base.trim_end_matches('/'));
    let body = json!({ "event": event, "listing": listing });
    spawn_fanout(state.http.clone(), url, body, "listing audit");
}

fn audit_event(
    listing_id: &str,
    event_type: ListingAuditType,
    actor: Option<String>,
    occurred_at: &str,
    details: Option<Value>,
) -> ListingAuditEvent {
    ListingAuditEvent {
        event_id: new_id("EVT"),
        listing_id: listing_id.to_string(),
        event_type,
        actor,
        occurred_at: occurred_at.to_string(),
        details,
    }
}

fn load_listing(state: &MarketplaceState, listing_id: &str) -> Result<MarketplaceListing, ApiError> {
    state
        .store
        .get_listing(listing_id)
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found("listing_not_found"))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingRequest {
    cert_id: String,
    seller: String,
    ask_price: String,
}

async fn create_listing(
    State(state): State<Arc<MarketplaceState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: CreateListingRequest = decode_body(&body)?;
    let ask_price = Amount::parse(&request.ask_price)
        .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))?;
    if request.seller.trim().is_empty() {
        return Err(ApiError::invalid_request("seller must not be empty"));
    }

    freeze_gate(&state).await?;

    let certificate = fetch_certificate(&state, &request.cert_id).await?;
    let payload = certificate
        .get("payload")
        .ok_or_else(|| ApiError::bad_gateway("certificate_service_invalid_response"))?;
    let owner = payload.get("owner").and_then(Value::as_str).unwrap_or_default();
    let status = payload.get("status").and_then(Value::as_str).unwrap_or_default();
    if owner != request.seller {
        return Err(ApiError::conflict("owner_mismatch").with_message(format!(
            "seller '{}' does not own certificate {}",
            request.seller, request.cert_id
        )));
    }
    if status != "ACTIVE" {
        return Err(ApiError::conflict("state_conflict")
            .with_message(format!("certificate {} is {status}, expected ACTIVE", request.cert_id)));
    }

    let now = now_iso();
    let listing = MarketplaceListing {
        listing_id: new_id("LST"),
        cert_id: request.cert_id,
        seller: request.seller.clone(),
        ask_price,
        status: ListingStatus::Open,
        created_at: now.clone(),
        updated_at: now.clone(),
        locked_by: None,
        locked_at: None,
        settled_at: None,
        settled_price: None,
        cancelled_at: None,
        cancel_reason: None,
        under_dispute: false,
        dispute_id: None,
        dispute_status: None,
        dispute_opened_at: None,
        dispute_resolved_at: None,
    };
    let audit = audit_event(
        &listing.listing_id,
        ListingAuditType::Created,
        Some(request.seller),
        &now,
        None,
    );
    state.store.insert_listing(&listing, &audit).map_err(store_err)?;
    fan_audit(&state, &audit, &listing);

    info!(listing_id = %listing.listing_id, cert_id = %listing.cert_id, "created listing");
    Ok((StatusCode::CREATED, Json(json!({ "listing": listing }))))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_listings(
    State(state): State<Arc<MarketplaceState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            ListingStatus::parse(raw).ok_or_else(|| {
                ApiError::bad_request("invalid_query")
                    .with_message(format!("unknown listing status '{raw}'"))
            })
        })
        .transpose()?;
    let listings = state.store.list_listings(status).map_err(store_err)?;
    Ok(Json(json!({ "listings": listings })))
}

async fn get_listing(
    State(state): State<Arc<MarketplaceState>>,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let listing = load_listing(&state, &listing_id)?;
    Ok(Json(json!({ "listing": listing })))
}

async fn listing_audit(
    State(state): State<Arc<MarketplaceState>>,
    Path(listing_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    load_listing(&state, &listing_id)?;
    let events = state.store.audit_trail(&listing_id).map_err(store_err)?;
    Ok(Json(json!({ "listingId": listing_id, "events": events })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockRequest {
    listing_id: String,
    buyer: String,
}

async fn lock_escrow(
    State(state): State<Arc<MarketplaceState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    state.auth.require(&headers)?;
    let key = idempotency_key(&headers)?;
    let request: LockRequest = decode_body(&body)?;
    if request.buyer.trim().is_empty() {
        return Err(ApiError::invalid_request("buyer must not be empty"));
    }

    let request_hash = match idempotency_begin(&state, "escrow.lock", &key, &body)? {
        IdemGate::Replay { status, body } => return Ok(replay_response(status, body)),
        IdemGate::Execute { request_hash } => request_hash,
    };

    freeze_gate(&state).await?;

    let listing = load_listing(&state, &request.listing_id)?;
    if listing.status != ListingStatus::Open {
        return Err(ApiError::conflict("state_conflict").with_message(format!(
            "listing {} is {}, expected OPEN",
            listing.listing_id, listing.status
        )));
    }

    request_status_transition(&state, &listing.cert_id, "LOCKED").await?;

    let now = now_iso();
    let mut updated = listing;
    updated.status = ListingStatus::Locked;
    updated.locked_by = Some(request.buyer.clone());
    updated.locked_at = Some(now.clone());
    updated.updated_at = now.clone();

    let audit = audit_event(
        &updated.listing_id,
        ListingAuditType::Locked,
        Some(request.buyer),
        &now,
        None,
    );
    let response_body = serde_json::to_string(&json!({ "listing": updated }))
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let record = IdempotencyRecord {
        action: "escrow.lock".into(),
        key,
        request_hash,
        response_status: 200,
        response_body: response_body.clone(),
        created_at: now,
    };
    state
        .store
        .apply_mutation(&updated, &audit, Some(&record))
        .map_err(store_err)?;
    fan_audit(&state, &audit, &updated);

    info!(listing_id = %updated.listing_id, "locked escrow");
    Ok(json_response(StatusCode::OK, response_body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleRequest {
    listing_id: String,
    buyer: String,
    settled_price: Option<String>,
}

async fn settle_escrow(
    State(state): State<Arc<MarketplaceState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    state.auth.require(&headers)?;
    let key = idempotency_key(&headers)?;
    let request: SettleRequest = decode_body(&body)?;

    let request_hash = match idempotency_begin(&state, "escrow.settle", &key, &body)? {
        IdemGate::Replay { status, body } => return Ok(replay_response(status, body)),
        IdemGate::Execute { request_hash } => request_hash,
    };

    freeze_gate(&state).await?;

    let listing = load_listing(&state, &request.listing_id)?;
    if listing.status != ListingStatus::Locked {
        return Err(ApiError::conflict("state_conflict").with_message(format!(
            "listing {} is {}, expected LOCKED",
            listing.listing_id, listing.status
        )));
    }
    if listing.locked_by.as_deref() != Some(request.buyer.as_str()) {
        return Err(ApiError::conflict("buyer_mismatch")
            .with_message("settlement buyer does not hold the escrow lock"));
    }
    let settled_price = match &request.settled_price {
        Some(raw) => Amount::parse(raw)
            .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))?,
        None => listing.ask_price,
    };

    // Phase 1: unlock the certificate.
    request_status_transition(&state, &listing.cert_id, "ACTIVE").await?;

    // Phase 2: transfer ownership. On failure, compensate by re-locking and
    // surface the transfer error unchanged.
    let transfer_body =
        match request_transfer(&state, &listing.cert_id, &request.buyer, settled_price).await {
            Ok(body) => body,
            Err(transfer_error) => {
                if let Err(rollback_error) =
                    request_status_transition(&state, &listing.cert_id, "LOCKED").await
                {
                    warn!(
                        listing_id = %listing.listing_id,
                        error = %rollback_error.code(),
                        "settle rollback failed; certificate left unlocked"
                    );
                }
                return Err(transfer_error);
            },
        };

    let now = now_iso();
    let mut updated = listing;
    updated.status = ListingStatus::Settled;
    updated.settled_at = Some(now.clone());
    updated.settled_price = Some(settled_price);
    updated.updated_at = now.clone();

    let audit = audit_event(
        &updated.listing_id,
        ListingAuditType::Settled,
        Some(request.buyer),
        &now,
        Some(json!({ "settledPrice": settled_price.to_string() })),
    );
    let response_body =
        serde_json::to_string(&json!({ "listing": updated, "transfer": transfer_body }))
            .map_err(|e| ApiError::internal(e.to_string()))?;
    let record = IdempotencyRecord {
        action: "escrow.settle".into(),
        key,
        request_hash,
        response_status: 200,
        response_body: response_body.clone(),
        created_at: now,
    };
    state
        .store
        .apply_mutation(&updated, &audit, Some(&record))
        .map_err(store_err)?;
    fan_audit(&state, &audit, &updated);

    info!(listing_id = %updated.listing_id, "settled escrow");
    Ok(json_response(StatusCode::OK, response_body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest {
    listing_id: String,
    reason: Option<String>,
}

async fn cancel_escrow(
    State(state): State<Arc<MarketplaceState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    state.auth.require(&headers)?;
    let key = idempotency_key(&headers)?;
    let request: CancelRequest = decode_body(&body)?;

    let request_hash = match idempotency_begin(&state, "escrow.cancel", &key, &body)? {
        IdemGate::Replay { status, body } => return Ok(replay_response(status, body)),
        IdemGate::Execute { request_hash } => request_hash,
    };

    // Cancel is intentionally not freeze-gated.
    let listing = load_listing(&state, &request.listing_id)?;
    if matches!(listing.status, ListingStatus::Settled | ListingStatus::Cancelled) {
        return Err(ApiError::conflict("state_conflict").with_message(format!(
            "listing {} is already {}",
            listing.listing_id, listing.status
        )));
    }

    if listing.status == ListingStatus::Locked {
        request_status_transition(&state, &listing.cert_id, "ACTIVE").await?;
    }

    let now = now_iso();
    let actor = listing.locked_by.clone().unwrap_or_else(|| listing.seller.clone());
    let mut updated = listing;
    updated.status = ListingStatus::Cancelled;
    updated.cancelled_at = Some(now.clone());
    updated.cancel_reason = request.reason.clone();
    updated.updated_at = now.clone();

    let details = request.reason.map(|reason| json!({ "reason": reason }));
    let audit = audit_event(
        &updated.listing_id,
        ListingAuditType::Cancelled,
        Some(actor),
        &now,
        details,
    );
    let response_body = serde_json::to_string(&json!({ "listing": updated }))
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let record = IdempotencyRecord {
        action: "escrow.cancel".into(),
        key,
        request_hash,
        response_status: 200,
        response_body: response_body.clone(),
        created_at: now,
    };
    state
        .store
        .apply_mutation(&updated, &audit, Some(&record))
        .map_err(store_err)?;
    fan_audit(&state, &audit, &updated);

    info!(listing_id = %updated.listing_id, "cancelled escrow");
    Ok(json_response(StatusCode::OK, response_body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenDisputeRequest {
    opened_by: String,
    reason: String,
    evidence: Option<Value>,
}

async fn open_dispute(
    State(state): State<Arc<MarketplaceState>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: OpenDisputeRequest = decode_body(&body)?;

    let listing = load_listing(&state, &listing_id)?;
    if listing.status != ListingStatus::Settled {
        return Err(ApiError::conflict("state_conflict").with_message(format!(
            "disputes require a SETTLED listing; {} is {}",
            listing.listing_id, listing.status
        )));
    }
    if listing.under_dispute {
        return Err(ApiError::conflict("dispute_already_open")
            .with_message(format!("listing {} is already under dispute", listing.listing_id)));
    }

    let Some(base) = &state.dispute_url else {
        return Err(ApiError::unavailable("dispute_service_not_configured"));
    };
    let url = format!("{}/disputes/open", base.trim_end_matches('/'));
    let dispute_request = json!({
        "listingId": listing.listing_id,
        "certId": listing.cert_id,
        "openedBy": request.opened_by,
        "reason": request.reason,
        "evidence": request.evidence,
    });
    let response = state
        .http
        .post_json(&url, &dispute_request, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::unavailable("dispute_service_unreachable").with_message(e.to_string())
        })?;
    if !response.is_success() {
        return Err(ApiError::bad_gateway("dispute_service_error")
            .with_downstream_status(response.status.as_u16()));
    }
    let dispute = response
        .body
        .get("dispute")
        .cloned()
        .ok_or_else(|| ApiError::bad_gateway("dispute_service_invalid_response"))?;
    let dispute_id = dispute
        .get("disputeId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let now = now_iso();
    let mut updated = listing;
    updated.under_dispute = true;
    updated.dispute_id = Some(dispute_id.clone());
    updated.dispute_status = Some("OPEN".to_string());
    updated.dispute_opened_at = Some(now.clone());
    updated.updated_at = now.clone();

    let audit = audit_event(
        &updated.listing_id,
        ListingAuditType::DisputeOpened,
        Some(request.opened_by),
        &now,
        Some(json!({ "disputeId": dispute_id })),
    );
    state
        .store
        .apply_mutation(&updated, &audit, None)
        .map_err(store_err)?;
    fan_audit(&state, &audit, &updated);

    info!(listing_id = %updated.listing_id, "opened dispute");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "listing": updated, "dispute": dispute })),
    ))
}

async fn health() -> Json<Value> {
    Json(health_body("marketplace"))
}
