//! HTTP surface of the certificate authority.
//!
//! Every mutation canonicalizes, re-signs, and persists the payload, then
//! makes two bounded outbound hops to the ledger adapter: a proof anchor and
//! a lineage event record. Hop failures never block the primary response;
//! they surface as `FAILED` in the `anchorStatus`/`eventStatus` fields.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use dgc_core::amount::{validate_purity, Amount};
use dgc_core::certificate::{
    sign_certificate, verify_certificate, CertificateStatus, GoldCertificate, SignedCertificate,
};
use dgc_core::event::LedgerEvent;

use crate::clients::{classify_hop, HopOutcome, PRIMARY_DEADLINE};
use crate::http::{decode_body, health_body, now_iso, ApiError};

use super::state::CertificateState;
use super::store::StoreError;

/// Builds the certificate authority router.
pub fn router(state: Arc<CertificateState>) -> Router {
    Router::new()
        .route("/certificates/issue", post(issue))
        .route("/certificates/verify", post(verify))
        .route("/certificates/transfer", post(transfer))
        .route("/certificates/split", post(split))
        .route("/certificates/status", post(status))
        .route("/certificates", get(list))
        .route("/certificates/:id", get(get_certificate))
        .route("/certificates/:id/timeline", get(timeline))
        .route("/openapi.json", get(openapi))
        .route("/health", get(health))
        .with_state(state)
}

fn store_err(e: StoreError) -> ApiError {
    ApiError::internal(e.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest {
    owner: String,
    amount_gram: String,
    purity: String,
    metadata: Option<BTreeMap<String, Value>>,
}

async fn issue(
    State(state): State<Arc<CertificateState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: IssueRequest = decode_body(&body)?;

    let amount = Amount::parse(&request.amount_gram)
        .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))?;
    validate_purity(&request.purity)
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    if request.owner.trim().is_empty() {
        return Err(ApiError::invalid_request("owner must not be empty"));
    }

    let mut payload = GoldCertificate::new(
        fresh_cert_id(),
        state.issuer_public.clone(),
        request.owner,
        amount,
        request.purity.clone(),
    );
    payload.metadata = request.metadata;

    let signed = sign_and_check(payload, &state)?;
    let now = now_iso();
    state.store.upsert(&signed, &now).map_err(store_err)?;

    let occurred_at = signed.payload.issued_at.clone();
    let (anchor_outcome, proof_hash) = anchor_hop(&state, &signed, &occurred_at).await;
    let event = LedgerEvent::Issued {
        cert_id: signed.payload.cert_id.clone(),
        occurred_at,
        proof_hash,
        owner: signed.payload.owner.clone(),
        amount_gram: signed.payload.amount_gram,
        purity: signed.payload.purity.clone(),
    };
    let record_outcome = record_hop(&state, &event).await;

    info!(cert_id = %signed.payload.cert_id, "issued certificate");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "certificate": signed,
            "anchorStatus": anchor_outcome.anchor_label(),
            "eventStatus": record_outcome.record_label(),
        })),
    ))
}

async fn get_certificate(
    State(state): State<Arc<CertificateState>>,
    Path(cert_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let cert = load(&state, &cert_id)?;
    Ok(Json(json!({ "certificate": cert })))
}

async fn list(State(state): State<Arc<CertificateState>>) -> Result<Json<Value>, ApiError> {
    let certificates = state.store.list().map_err(store_err)?;
    Ok(Json(json!({ "certificates": certificates })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    cert_id: Option<String>,
    certificate: Option<SignedCertificate>,
}

async fn verify(
    State(state): State<Arc<CertificateState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request: VerifyRequest = decode_body(&body)?;
    let cert = match (request.cert_id, request.certificate) {
        (Some(cert_id), _) => load(&state, &cert_id)?,
        (None, Some(cert)) => cert,
        (None, None) => {
            return Err(ApiError::invalid_request(
                "either certId or certificate is required",
            ))
        },
    };
    Ok(Json(serde_json::to_value(verify_certificate(&cert)).map_err(
        |e| ApiError::internal(e.to_string()),
    )?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    cert_id: String,
    to_owner: String,
    price: Option<String>,
}

async fn transfer(
    State(state): State<Arc<CertificateState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: TransferRequest = decode_body(&body)?;
    if request.to_owner.trim().is_empty() {
        return Err(ApiError::invalid_request("toOwner must not be empty"));
    }
    let price = parse_optional_price(request.price.as_deref())?;

    let current = load(&state, &request.cert_id)?;
    require_active(&current)?;

    let now = now_iso();
    let from_owner = current.payload.owner.clone();
    let mut payload = current.payload;
    payload.owner = request.to_owner.clone();
    payload.set_metadata("lastTransferAt", Value::String(now.clone()));
    if let Some(price) = price {
        payload.set_metadata("lastTransferPrice", Value::String(price.to_string()));
    }

    let signed = sign_and_check(payload, &state)?;
    state.store.upsert(&signed, &now).map_err(store_err)?;

    let (anchor_outcome, proof_hash) = anchor_hop(&state, &signed, &now).await;
    let event = LedgerEvent::Transfer {
        cert_id: signed.payload.cert_id.clone(),
        occurred_at: now,
        proof_hash,
        from: from_owner,
        to: request.to_owner,
        amount_gram: signed.payload.amount_gram,
        price,
    };
    let record_outcome = record_hop(&state, &event).await;

    info!(cert_id = %signed.payload.cert_id, "transferred certificate");
    Ok(Json(json!({
        "certificate": signed,
        "anchorStatus": anchor_outcome.anchor_label(),
        "eventStatus": record_outcome.record_label(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SplitRequest {
    parent_cert_id: String,
    to_owner: String,
    amount_child_gram: String,
    #[allow(dead_code)]
    price: Option<String>,
}

async fn split(
    State(state): State<Arc<CertificateState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: SplitRequest = decode_body(&body)?;
    if request.to_owner.trim().is_empty() {
        return Err(ApiError::invalid_request("toOwner must not be empty"));
    }
    let child_amount = Amount::parse(&request.amount_child_gram)
        .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))?;

    let parent = load(&state, &request.parent_cert_id)?;
    require_active(&parent)?;

    let parent_amount = parent.payload.amount_gram;
    if !child_amount.is_positive() || child_amount.scaled() >= parent_amount.scaled() {
        return Err(ApiError::bad_request("invalid_amount").with_message(format!(
            "amountChildGram must be positive and below the parent amount {parent_amount}"
        )));
    }
    // Exact on the scaled integers; the bounds check above makes this
    // subtraction infallible.
    let remainder = parent_amount
        .checked_sub(child_amount)
        .ok_or_else(|| ApiError::internal("amount underflow"))?;

    let now = now_iso();
    let parent_owner = parent.payload.owner.clone();

    let mut child_payload = GoldCertificate::new(
        fresh_cert_id(),
        parent.payload.issuer.clone(),
        request.to_owner.clone(),
        child_amount,
        parent.payload.purity.clone(),
    );
    child_payload.set_metadata(
        "parentCertId",
        Value::String(parent.payload.cert_id.clone()),
    );

    let mut parent_payload = parent.payload;
    parent_payload.amount_gram = remainder;
    parent_payload.set_metadata("lastSplitAt", Value::String(now.clone()));

    let signed_parent = sign_and_check(parent_payload, &state)?;
    let signed_child = sign_and_check(child_payload, &state)?;
    state
        .store
        .upsert_pair(&signed_parent, &signed_child, &now)
        .map_err(store_err)?;

    let (parent_anchor, parent_proof) = anchor_hop(&state, &signed_parent, &now).await;
    let (child_anchor, _) = anchor_hop(&state, &signed_child, &now).await;
    let anchor_outcome = HopOutcome::combine(&[parent_anchor, child_anchor]);

    let event = LedgerEvent::Split {
        cert_id: signed_parent.payload.cert_id.clone(),
        occurred_at: now,
        proof_hash: parent_proof,
        parent_cert_id: signed_parent.payload.cert_id.clone(),
        child_cert_id: signed_child.payload.cert_id.clone(),
        from: parent_owner,
        to: request.to_owner,
        amount_child_gram: child_amount,
    };
    let record_outcome = record_hop(&state, &event).await;

    info!(
        parent = %signed_parent.payload.cert_id,
        child = %signed_child.payload.cert_id,
        "split certificate"
    );
    Ok(Json(json!({
        "parent": signed_parent,
        "child": signed_child,
        "anchorStatus": anchor_outcome.anchor_label(),
        "eventStatus": record_outcome.record_label(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    cert_id: String,
    status: String,
}

async fn status(
    State(state): State<Arc<CertificateState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: StatusRequest = decode_body(&body)?;
    let next = CertificateStatus::parse(&request.status).ok_or_else(|| {
        ApiError::bad_request("invalid_status")
            .with_message(format!("unknown status '{}'", request.status))
    })?;

    let current = load(&state, &request.cert_id)?;
    let from = current.payload.status;
    if !from.can_transition_to(next) {
        return Err(ApiError::conflict("state_conflict")
            .with_message(format!("Transition {from} -> {next} is not allowed")));
    }

    let now = now_iso();
    let mut payload = current.payload;
    payload.status = next;
    payload.set_metadata("lastStatusChangeAt", Value::String(now.clone()));

    let signed = sign_and_check(payload, &state)?;
    state.store.upsert(&signed, &now).map_err(store_err)?;

    let (anchor_outcome, proof_hash) = anchor_hop(&state, &signed, &now).await;
    let event = LedgerEvent::StatusChanged {
        cert_id: signed.payload.cert_id.clone(),
        occurred_at: now,
        proof_hash,
        status: next,
    };
    let record_outcome = record_hop(&state, &event).await;

    info!(cert_id = %signed.payload.cert_id, status = %next, "changed certificate status");
    Ok(Json(json!({
        "certificate": signed,
        "anchorStatus": anchor_outcome.anchor_label(),
        "eventStatus": record_outcome.record_label(),
    })))
}

async fn timeline(
    State(state): State<Arc<CertificateState>>,
    Path(cert_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let Some(base) = &state.ledger_url else {
        return Err(ApiError::unavailable("ledger_adapter_not_configured"));
    };
    let url = format!("{}/events/{cert_id}", base.trim_end_matches('/'));
    let response = state
        .http
        .get_json(&url, PRIMARY_DEADLINE)
        .await
        .map_err(|e| {
            ApiError::bad_gateway("ledger_adapter_unreachable").with_message(e.to_string())
        })?;

    if response.status == StatusCode::NOT_FOUND {
        return Ok(Json(json!({ "certId": cert_id, "events": [] })));
    }
    if !response.is_success() {
        return Err(ApiError::bad_gateway("ledger_adapter_error")
            .with_downstream_status(response.status.as_u16()));
    }
    Ok(Json(response.body))
}

async fn openapi() -> Json<Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": {
            "title": "DGC Certificate Authority",
            "version": "0.1.0",
            "description": "Issues, verifies, transfers, splits, and retires signed gold certificates."
        },
        "paths": {
            "/certificates/issue": { "post": { "summary": "Issue a signed certificate" } },
            "/certificates/verify": { "post": { "summary": "Verify hash and signature" } },
            "/certificates/transfer": { "post": { "summary": "Transfer ownership" } },
            "/certificates/split": { "post": { "summary": "Amount-conserving split" } },
            "/certificates/status": { "post": { "summary": "Lifecycle transition" } },
            "/certificates": { "get": { "summary": "List certificates" } },
            "/certificates/{id}": { "get": { "summary": "Fetch one certificate" } },
            "/certificates/{id}/timeline": { "get": { "summary": "Lineage events via the ledger adapter" } },
            "/health": { "get": { "summary": "Liveness probe" } }
        }
    }))
}

async fn health() -> Json<Value> {
    Json(health_body("certificate-authority"))
}

/// Fresh opaque certificate id: `DGC-` + compact UTC timestamp + random
/// suffix.
fn fresh_cert_id() -> String {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("DGC-{stamp}-{}", &suffix[..8])
}

fn load(state: &CertificateState, cert_id: &str) -> Result<SignedCertificate, ApiError> {
    state
        .store
        .get(cert_id)
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found("certificate_not_found"))
}

fn require_active(cert: &SignedCertificate) -> Result<(), ApiError> {
    if cert.payload.status == CertificateStatus::Active {
        Ok(())
    } else {
        Err(ApiError::conflict("state_conflict").with_message(format!(
            "certificate {} is {}, expected ACTIVE",
            cert.payload.cert_id, cert.payload.status
        )))
    }
}

fn parse_optional_price(raw: Option<&str>) -> Result<Option<Amount>, ApiError> {
    raw.map(|p| {
        Amount::parse(p)
            .map_err(|e| ApiError::bad_request("invalid_amount").with_message(e.to_string()))
    })
    .transpose()
}

fn sign_and_check(
    payload: GoldCertificate,
    state: &CertificateState,
) -> Result<SignedCertificate, ApiError> {
    use dgc_core::certificate::CertificateError;
    sign_certificate(payload, state.issuer_secret_hex()).map_err(|e| match e {
        CertificateError::Canonical(inner) => ApiError::invalid_request(inner.to_string()),
        other => ApiError::internal(other.to_string()),
    })
}

/// Anchors a proof at the ledger adapter. Returns the hop outcome and, on
/// success, the adapter-computed proof hash to stamp onto the lineage event.
async fn anchor_hop(
    state: &CertificateState,
    cert: &SignedCertificate,
    occurred_at: &str,
) -> (HopOutcome, Option<String>) {
    let Some(base) = &state.ledger_url else {
        return (HopOutcome::Skipped, None);
    };
    let url = format!("{}/proofs/anchor", base.trim_end_matches('/'));
    let body = json!({
        "certId": cert.payload.cert_id,
        "payloadHash": cert.payload_hash,
        "occurredAt": occurred_at,
    });
    let result = state.http.post_json(&url, &body, PRIMARY_DEADLINE).await;
    let outcome = classify_hop(&result, "proof anchor");
    let proof_hash = match (&outcome, result) {
        (HopOutcome::Delivered, Ok(response)) => response
            .body
            .get("proofHash")
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    };
    (outcome, proof_hash)
}

/// Records a lineage event at the ledger adapter.
async fn record_hop(state: &CertificateState, event: &LedgerEvent) -> HopOutcome {
    let Some(base) = &state.ledger_url else {
        return HopOutcome::Skipped;
    };
    let url = format!("{}/events/record", base.trim_end_matches('/'));
    let body = match serde_json::to_value(event) {
        Ok(body) => body,
        Err(_) => return HopOutcome::Failed,
    };
    let result = state.http.post_json(&url, &body, PRIMARY_DEADLINE).await;
    classify_hop(&result, "event record")
}
