//! HTTP surface of the ledger adapter.
//!
//! Recording is chain-first: when a sink is configured the event is
//! submitted synchronously and a failed chain write aborts the local append
//! with 502 `chain_write_failed`. Successful records fan out to the risk
//! engine on a detached task.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use dgc_core::canonical;
use dgc_core::crypto::sha256_hex;
use dgc_core::event::{LedgerEvent, ProofAnchor};

use crate::auth::ServiceAuth;
use crate::clients::{spawn_fanout, HttpClient};
use crate::config::LedgerConfig;
use crate::http::{decode_body, health_body, now_iso, ApiError};

use super::book::{LedgerBook, RecordedEvent};
use super::chain::ChainSink;

/// Shared state of the ledger adapter.
#[derive(Debug)]
pub struct LedgerState {
    /// In-memory proofs and timelines.
    pub book: LedgerBook,
    /// Service-token gate for write endpoints.
    pub auth: ServiceAuth,
    /// Chain sink, when configured.
    pub chain: Option<ChainSink>,
    /// Risk engine base URL for event fan-out.
    pub risk_url: Option<String>,
    /// Outbound HTTP client.
    pub http: HttpClient,
}

impl LedgerState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns the HTTP client builder error.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, reqwest::Error> {
        let http = HttpClient::new(config.common.service_token.clone())?;
        let chain = ChainSink::from_parts(
            config.chain_rpc_url.clone(),
            config.chain_private_key.as_ref(),
            config.registry_address.clone(),
            http.clone(),
        )?;
        Ok(Self {
            book: LedgerBook::default(),
            auth: ServiceAuth::new(config.common.service_token.clone()),
            chain,
            risk_url: config.risk_stream_url.clone(),
            http,
        })
    }
}

/// Builds the ledger adapter router.
pub fn router(state: Arc<LedgerState>) -> Router {
    Router::new()
        .route("/proofs/anchor", post(anchor))
        .route("/proofs/:id", get(get_proof))
        .route("/events/record", post(record))
        .route("/events/:id", get(timeline))
        .route("/chain/status", get(chain_status))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorRequest {
    cert_id: String,
    payload_hash: String,
    occurred_at: String,
}

async fn anchor(
    State(state): State<Arc<LedgerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: AnchorRequest = decode_body(&body)?;
    if request.cert_id.trim().is_empty() || request.payload_hash.trim().is_empty() {
        return Err(ApiError::invalid_request(
            "certId and payloadHash must not be empty",
        ));
    }

    let anchored_at = now_iso();
    let anchor = ProofAnchor::derive(
        &request.cert_id,
        &request.payload_hash,
        &request.occurred_at,
        &anchored_at,
    )
    .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    state.book.put_proof(anchor.clone());
    info!(cert_id = %anchor.cert_id, "anchored proof");
    Ok((StatusCode::CREATED, Json(json!({ "proof": anchor }))))
}

async fn get_proof(
    State(state): State<Arc<LedgerState>>,
    Path(cert_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let proof = state
        .book
        .get_proof(&cert_id)
        .ok_or_else(|| ApiError::not_found("proof_not_found"))?;
    Ok(Json(json!({ "proof": proof })))
}

async fn record(
    State(state): State<Arc<LedgerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let event: LedgerEvent = decode_body(&body)?;
    event
        .validate()
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;

    // Chain write is the authoritative side effect: nothing lands locally
    // when the sink rejects the event.
    let ledger_tx_ref = match &state.chain {
        Some(sink) => Some(sink.submit(&event).await.map_err(|e| {
            ApiError::bad_gateway("chain_write_failed").with_message(e.to_string())
        })?),
        None => None,
    };

    let canonical_event = canonical::canonical_json_of(&event)
        .map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let event_hash = sha256_hex(&canonical_event);

    let recorded = RecordedEvent {
        event,
        event_hash,
        ledger_tx_ref,
    };
    state.book.append(recorded.clone());
    info!(
        cert_id = %recorded.event.cert_id(),
        event_type = recorded.event.type_name(),
        "recorded lineage event"
    );

    if let Some(risk_url) = &state.risk_url {
        let url = format!("{}/ingest/ledger-event", risk_url.trim_end_matches('/'));
        if let Ok(event_body) = serde_json::to_value(&recorded.event) {
            spawn_fanout(state.http.clone(), url, event_body, "ledger event");
        }
    }

    let mut response = json!({
        "event": recorded.event,
        "eventHash": recorded.event_hash,
    });
    if let Some(tx_ref) = recorded.ledger_tx_ref {
        response["ledgerTxRef"] = Value::String(tx_ref);
    }
    Ok((StatusCode::CREATED, Json(response)))
}

async fn timeline(
    State(state): State<Arc<LedgerState>>,
    Path(cert_id): Path<String>,
) -> Json<Value> {
    let events = state.book.timeline(&cert_id);
    Json(json!({ "certId": cert_id, "events": events }))
}

async fn chain_status(State(state): State<Arc<LedgerState>>) -> Json<Value> {
    match &state.chain {
        Some(sink) => Json(sink.status().await),
        None => Json(json!({ "configured": false })),
    }
}

async fn health() -> Json<Value> {
    Json(health_body("ledger-adapter"))
}
