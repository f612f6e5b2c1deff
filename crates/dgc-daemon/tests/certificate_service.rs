//! End-to-end tests of the certificate authority: issue/verify round trips,
//! tamper detection, split conservation, and the lifecycle state machine.

mod common;

use reqwest::StatusCode;
use serde_json::json;

use common::{get, issue_certificate, post, post_with_headers, spawn_certificate};

#[tokio::test]
async fn issue_then_verify_detects_tampering() {
    let base = spawn_certificate(None).await;

    let (status, body) = post(
        &format!("{base}/certificates/issue"),
        json!({ "owner": "0xA", "amountGram": "1.2500", "purity": "999.9" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["certificate"]["payload"]["status"], "ACTIVE");
    assert_eq!(body["certificate"]["payload"]["amountGram"], "1.2500");
    // No ledger adapter configured: both hops are SKIPPED.
    assert_eq!(body["anchorStatus"], "SKIPPED");
    assert_eq!(body["eventStatus"], "SKIPPED");

    let cert_id = body["certificate"]["payload"]["certId"].as_str().unwrap();
    assert!(cert_id.starts_with("DGC-"));

    let (status, report) = post(
        &format!("{base}/certificates/verify"),
        json!({ "certId": cert_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], true);
    assert_eq!(report["hashMatches"], true);
    assert_eq!(report["signatureValid"], true);

    // Tamper with the amount and verify the full certificate body.
    let mut tampered = body["certificate"].clone();
    tampered["payload"]["amountGram"] = json!("3.0000");
    let (status, report) = post(
        &format!("{base}/certificates/verify"),
        json!({ "certificate": tampered }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["valid"], false);
    assert_eq!(report["hashMatches"], false);
    assert_eq!(report["signatureValid"], false);
}

#[tokio::test]
async fn split_conserves_amounts_exactly() {
    let base = spawn_certificate(None).await;
    let parent_id = issue_certificate(&base, "0xA", "3.0000", "999.9").await;

    let (status, body) = post(
        &format!("{base}/certificates/split"),
        json!({
            "parentCertId": parent_id,
            "toOwner": "0xB",
            "amountChildGram": "1.2500",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "split failed: {body}");
    assert_eq!(body["parent"]["payload"]["amountGram"], "1.7500");
    assert_eq!(body["parent"]["payload"]["owner"], "0xA");
    assert_eq!(body["child"]["payload"]["amountGram"], "1.2500");
    assert_eq!(body["child"]["payload"]["owner"], "0xB");
    assert_eq!(body["child"]["payload"]["purity"], "999.9");
    assert_eq!(
        body["child"]["payload"]["metadata"]["parentCertId"],
        json!(parent_id)
    );

    // Both halves re-verify after the split.
    for cert in ["parent", "child"] {
        let (status, report) = post(
            &format!("{base}/certificates/verify"),
            json!({ "certificate": body[cert] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["valid"], true, "{cert} failed verification");
    }
}

#[tokio::test]
async fn split_rejects_out_of_range_child_amounts() {
    let base = spawn_certificate(None).await;
    let parent_id = issue_certificate(&base, "0xA", "3.0000", "999.9").await;

    for bad in ["0", "3.0000", "4.0000"] {
        let (status, body) = post(
            &format!("{base}/certificates/split"),
            json!({ "parentCertId": parent_id, "toOwner": "0xB", "amountChildGram": bad }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {bad}");
        assert_eq!(body["error"], "invalid_amount");
    }
}

#[tokio::test]
async fn illegal_transition_is_a_state_conflict() {
    let base = spawn_certificate(None).await;
    let cert_id = issue_certificate(&base, "0xA", "1.0000", "999.9").await;

    let (status, _) = post(
        &format!("{base}/certificates/status"),
        json!({ "certId": cert_id, "status": "REDEEMED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &format!("{base}/certificates/status"),
        json!({ "certId": cert_id, "status": "ACTIVE" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");
    assert_eq!(body["message"], "Transition REDEEMED -> ACTIVE is not allowed");
}

#[tokio::test]
async fn transfer_requires_active_status() {
    let base = spawn_certificate(None).await;
    let cert_id = issue_certificate(&base, "0xA", "1.0000", "999.9").await;

    let (status, body) = post(
        &format!("{base}/certificates/transfer"),
        json!({ "certId": cert_id, "toOwner": "0xB", "price": "100.0000" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["certificate"]["payload"]["owner"], "0xB");
    assert!(body["certificate"]["payload"]["metadata"]["lastTransferAt"].is_string());
    assert_eq!(
        body["certificate"]["payload"]["metadata"]["lastTransferPrice"],
        "100.0000"
    );

    // Lock it and the next transfer conflicts.
    let (status, _) = post(
        &format!("{base}/certificates/status"),
        json!({ "certId": cert_id, "status": "LOCKED" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &format!("{base}/certificates/transfer"),
        json!({ "certId": cert_id, "toOwner": "0xC" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state_conflict");
}

#[tokio::test]
async fn input_validation_rejects_malformed_fields() {
    let base = spawn_certificate(None).await;

    let (status, body) = post(
        &format!("{base}/certificates/issue"),
        json!({ "owner": "0xA", "amountGram": "1.23456", "purity": "999.9" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_amount");

    let (status, body) = post(
        &format!("{base}/certificates/issue"),
        json!({ "owner": "0xA", "amountGram": "1.25", "purity": "99.9" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) = post(
        &format!("{base}/certificates/status"),
        json!({ "certId": "DGC-missing", "status": "MELTED" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");
}

#[tokio::test]
async fn unknown_certificate_is_not_found() {
    let base = spawn_certificate(None).await;
    let (status, body) = get(&format!("{base}/certificates/DGC-unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "certificate_not_found");

    let (status, body) = post(
        &format!("{base}/certificates/transfer"),
        json!({ "certId": "DGC-unknown", "toOwner": "0xB" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "certificate_not_found");
}

#[tokio::test]
async fn list_returns_certificates_in_cert_id_order() {
    let base = spawn_certificate(None).await;
    for _ in 0..3 {
        issue_certificate(&base, "0xA", "1.0000", "999.9").await;
    }
    let (status, body) = get(&format!("{base}/certificates")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["certificates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["payload"]["certId"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn timeline_without_ledger_adapter_is_unavailable() {
    let base = spawn_certificate(None).await;
    let cert_id = issue_certificate(&base, "0xA", "1.0000", "999.9").await;
    let (status, body) = get(&format!("{base}/certificates/{cert_id}/timeline")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "ledger_adapter_not_configured");
}

#[tokio::test]
async fn service_token_gates_writes_when_configured() {
    use dgc_daemon::certificate::{CertificateState, CertificateStore};
    use secrecy::SecretString;

    let state = CertificateState::new(
        CertificateStore::open_in_memory().unwrap(),
        SecretString::from(common::ISSUER_SK.to_string()),
        Some(SecretString::from("shared-secret".to_string())),
        None,
    )
    .unwrap();
    let base = common::spawn(dgc_daemon::certificate::router(std::sync::Arc::new(state))).await;

    let issue = json!({ "owner": "0xA", "amountGram": "1.0000", "purity": "999.9" });
    let (status, body) = post(&format!("{base}/certificates/issue"), issue.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized_service");

    let (status, _) = post_with_headers(
        &format!("{base}/certificates/issue"),
        issue,
        &[("x-service-token", "shared-secret")],
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Reads stay open.
    let (status, _) = get(&format!("{base}/certificates")).await;
    assert_eq!(status, StatusCode::OK);
}
