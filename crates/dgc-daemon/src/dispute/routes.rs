//! HTTP surface of the dispute orchestrator.
//!
//! Open is service-gated; assign and resolve additionally require the
//! governance gate with their own allowed role sets. RESOLVED is terminal.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use dgc_core::dispute::{DisputeRecord, DisputeResolution, DisputeStatus};
use dgc_core::trust::RoleSet;

use crate::auth::{require_governance, ServiceAuth};
use crate::config::DisputeConfig;
use crate::http::{decode_body, health_body, new_id, now_iso, ApiError};

use super::store::{DisputeStore, StoreError};

/// Shared state of the dispute orchestrator.
#[derive(Debug)]
pub struct DisputeState {
    /// Dispute records.
    pub store: DisputeStore,
    /// Service-token gate for write endpoints.
    pub auth: ServiceAuth,
    /// Roles allowed to assign.
    pub assign_roles: RoleSet,
    /// Roles allowed to resolve.
    pub resolve_roles: RoleSet,
}

impl DisputeState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails to open.
    pub fn from_config(config: &DisputeConfig) -> Result<Self, StoreError> {
        Ok(Self {
            store: DisputeStore::open(&config.db_path)?,
            auth: ServiceAuth::new(config.common.service_token.clone()),
            assign_roles: config.assign_roles.clone(),
            resolve_roles: config.resolve_roles.clone(),
        })
    }
}

/// Builds the dispute router.
pub fn router(state: Arc<DisputeState>) -> Router {
    Router::new()
        .route("/disputes/open", post(open))
        .route("/disputes/:id/assign", post(assign))
        .route("/disputes/:id/resolve", post(resolve))
        .route("/disputes/:id", get(get_dispute))
        .route("/disputes", get(list))
        .route("/health", get(health))
        .with_state(state)
}

fn store_err(e: StoreError) -> ApiError {
    ApiError::internal(e.to_string())
}

fn load(state: &DisputeState, dispute_id: &str) -> Result<DisputeRecord, ApiError> {
    state
        .store
        .get(dispute_id)
        .map_err(store_err)?
        .ok_or_else(|| ApiError::not_found("dispute_not_found"))
}

fn require_unresolved(dispute: &DisputeRecord) -> Result<(), ApiError> {
    if dispute.status == DisputeStatus::Resolved {
        Err(ApiError::conflict("state_conflict")
            .with_message(format!("dispute {} is already RESOLVED", dispute.dispute_id)))
    } else {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenRequest {
    listing_id: String,
    cert_id: String,
    opened_by: String,
    reason: String,
    evidence: Option<Value>,
}

async fn open(
    State(state): State<Arc<DisputeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.auth.require(&headers)?;
    let request: OpenRequest = decode_body(&body)?;
    for (value, field) in [
        (&request.listing_id, "listingId"),
        (&request.cert_id, "certId"),
        (&request.opened_by, "openedBy"),
        (&request.reason, "reason"),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::invalid_request(format!("{field} must not be empty")));
        }
    }

    let dispute = DisputeRecord {
        dispute_id: new_id("DSP"),
        listing_id: request.listing_id,
        cert_id: request.cert_id,
        status: DisputeStatus::Open,
        opened_by: request.opened_by,
        reason: request.reason,
        evidence: request.evidence,
        opened_at: now_iso(),
        assigned_to: None,
        assigned_at: None,
        resolved_by: None,
        resolved_at: None,
        resolution: None,
        resolution_notes: None,
    };
    state.store.upsert(&dispute).map_err(store_err)?;

    info!(dispute_id = %dispute.dispute_id, listing_id = %dispute.listing_id, "opened dispute");
    Ok((StatusCode::CREATED, Json(json!({ "dispute": dispute }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest {
    assigned_by: String,
    assignee: String,
}

async fn assign(
    State(state): State<Arc<DisputeState>>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: AssignRequest = decode_body(&body)?;
    require_governance(&headers, &state.assign_roles, Some(&request.assigned_by))?;
    if request.assignee.trim().is_empty() {
        return Err(ApiError::invalid_request("assignee must not be empty"));
    }

    let mut dispute = load(&state, &dispute_id)?;
    require_unresolved(&dispute)?;

    dispute.status = DisputeStatus::Assigned;
    dispute.assigned_to = Some(request.assignee);
    dispute.assigned_at = Some(now_iso());
    state.store.upsert(&dispute).map_err(store_err)?;

    info!(dispute_id = %dispute.dispute_id, "assigned dispute");
    Ok(Json(json!({ "dispute": dispute })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    resolved_by: String,
    resolution: DisputeResolution,
    resolution_notes: Option<String>,
}

async fn resolve(
    State(state): State<Arc<DisputeState>>,
    Path(dispute_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    state.auth.require(&headers)?;
    let request: ResolveRequest = decode_body(&body)?;
    require_governance(&headers, &state.resolve_roles, Some(&request.resolved_by))?;

    let mut dispute = load(&state, &dispute_id)?;
    require_unresolved(&dispute)?;

    dispute.status = DisputeStatus::Resolved;
    dispute.resolved_by = Some(request.resolved_by);
    dispute.resolved_at = Some(now_iso());
    dispute.resolution = Some(request.resolution);
    dispute.resolution_notes = request.resolution_notes;
    state.store.upsert(&dispute).map_err(store_err)?;

    info!(dispute_id = %dispute.dispute_id, "resolved dispute");
    Ok(Json(json!({ "dispute": dispute })))
}

async fn get_dispute(
    State(state): State<Arc<DisputeState>>,
    Path(dispute_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let dispute = load(&state, &dispute_id)?;
    Ok(Json(json!({ "dispute": dispute })))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list(
    State(state): State<Arc<DisputeState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            DisputeStatus::parse(raw).ok_or_else(|| {
                ApiError::bad_request("invalid_query")
                    .with_message(format!("unknown dispute status '{raw}'"))
            })
        })
        .transpose()?;
    let disputes = state.store.list(status).map_err(store_err)?;
    Ok(Json(json!({ "disputes": disputes })))
}

async fn health() -> Json<Value> {
    Json(health_body("dispute"))
}
