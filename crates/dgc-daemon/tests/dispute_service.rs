//! End-to-end tests of the dispute orchestrator: lifecycle transitions and
//! governance RBAC on assign and resolve.

mod common;

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use dgc_core::trust::RoleSet;
use dgc_daemon::auth::ServiceAuth;
use dgc_daemon::dispute::{DisputeState, DisputeStore};

use common::{get, post, post_with_headers, spawn};

async fn spawn_dispute() -> String {
    let state = DisputeState {
        store: DisputeStore::open_in_memory().unwrap(),
        auth: ServiceAuth::new(None),
        assign_roles: RoleSet::parse("ops_admin,ops_agent,admin"),
        resolve_roles: RoleSet::parse("ops_admin,ops_lead,admin"),
    };
    spawn(dgc_daemon::dispute::router(Arc::new(state))).await
}

async fn open_dispute(base: &str) -> String {
    let (status, body) = post(
        &format!("{base}/disputes/open"),
        json!({
            "listingId": "LST-1",
            "certId": "DGC-1",
            "openedBy": "buyer-1",
            "reason": "gold bar not delivered",
            "evidence": { "tracking": "none" },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "open failed: {body}");
    assert_eq!(body["dispute"]["status"], "OPEN");
    body["dispute"]["disputeId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn open_assign_resolve_lifecycle() {
    let base = spawn_dispute().await;
    let dispute_id = open_dispute(&base).await;

    let (status, body) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/assign"),
        json!({ "assignedBy": "ops-1", "assignee": "agent-7" }),
        &[("x-governance-role", "ops_agent")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "assign failed: {body}");
    assert_eq!(body["dispute"]["status"], "ASSIGNED");
    assert_eq!(body["dispute"]["assignedTo"], "agent-7");

    let (status, body) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/resolve"),
        json!({
            "resolvedBy": "lead-1",
            "resolution": "REFUND_BUYER",
            "resolutionNotes": "seller never shipped",
        }),
        &[("x-governance-role", "ops_lead")],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "resolve failed: {body}");
    assert_eq!(body["dispute"]["status"], "RESOLVED");
    assert_eq!(body["dispute"]["resolution"], "REFUND_BUYER");

    // RESOLVED is terminal for both assign and resolve.
    let (status, body) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/assign"),
        json!({ "assignedBy": "ops-1", "assignee": "agent-8" }),
        &[("x-governance-role", "ops_admin")],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");

    let (status, _) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/resolve"),
        json!({ "resolvedBy": "lead-1", "resolution": "MANUAL_REVIEW" }),
        &[("x-governance-role", "ops_lead")],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn governance_roles_are_enforced_per_operation() {
    let base = spawn_dispute().await;
    let dispute_id = open_dispute(&base).await;

    // No role header.
    let (status, body) = post(
        &format!("{base}/disputes/{dispute_id}/assign"),
        json!({ "assignedBy": "ops-1", "assignee": "agent-7" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    // ops_agent may assign but not resolve.
    let (status, _) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/resolve"),
        json!({ "resolvedBy": "ops-1", "resolution": "RELEASE_SELLER" }),
        &[("x-governance-role", "ops_agent")],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Actor-consistency guard.
    let (status, _) = post_with_headers(
        &format!("{base}/disputes/{dispute_id}/assign"),
        json!({ "assignedBy": "ops-1", "assignee": "agent-7" }),
        &[("x-governance-role", "ops_admin"), ("x-governance-actor", "someone-else")],
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reads_and_filters() {
    let base = spawn_dispute().await;
    let dispute_id = open_dispute(&base).await;

    let (status, body) = get(&format!("{base}/disputes/{dispute_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dispute"]["listingId"], "LST-1");

    let (status, body) = get(&format!("{base}/disputes?status=OPEN")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["disputes"].as_array().unwrap().len(), 1);

    let (status, body) = get(&format!("{base}/disputes?status=RESOLVED")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["disputes"].as_array().unwrap().is_empty());

    let (status, body) = get(&format!("{base}/disputes?status=JUNK")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_query");

    let (status, body) = get(&format!("{base}/disputes/DSP-unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "dispute_not_found");
}

#[tokio::test]
async fn open_validates_required_fields() {
    let base = spawn_dispute().await;
    let (status, body) = post(
        &format!("{base}/disputes/open"),
        json!({ "listingId": "LST-1", "certId": "DGC-1", "openedBy": " ", "reason": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}
