//! End-to-end tests of the ledger adapter: proof anchoring, event
//! recording, timeline ordering, and the certificate authority's hop
//! classification when wired to a live adapter.

mod common;

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use dgc_daemon::auth::ServiceAuth;
use dgc_daemon::clients::HttpClient;
use dgc_daemon::ledger::{LedgerBook, LedgerState};

use common::{get, issue_certificate, post, spawn, spawn_certificate};

fn ledger_state(risk_url: Option<String>) -> LedgerState {
    LedgerState {
        book: LedgerBook::default(),
        auth: ServiceAuth::new(None),
        chain: None,
        risk_url,
        http: HttpClient::new(None).unwrap(),
    }
}

async fn spawn_ledger() -> String {
    spawn(dgc_daemon::ledger::router(Arc::new(ledger_state(None)))).await
}

#[tokio::test]
async fn anchor_then_fetch_proof() {
    let base = spawn_ledger().await;

    let (status, body) = post(
        &format!("{base}/proofs/anchor"),
        json!({
            "certId": "DGC-1",
            "payloadHash": "ab".repeat(32),
            "occurredAt": "2026-01-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let proof_hash = body["proof"]["proofHash"].as_str().unwrap();
    assert_eq!(proof_hash.len(), 64);

    let (status, body) = get(&format!("{base}/proofs/DGC-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["proof"]["proofHash"], proof_hash);

    let (status, body) = get(&format!("{base}/proofs/DGC-unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "proof_not_found");
}

#[tokio::test]
async fn record_appends_in_arrival_order() {
    let base = spawn_ledger().await;

    for (from, to) in [("a", "b"), ("b", "c")] {
        let (status, body) = post(
            &format!("{base}/events/record"),
            json!({
                "type": "TRANSFER",
                "certId": "DGC-1",
                "occurredAt": "2026-01-01T00:00:00Z",
                "from": from,
                "to": to,
                "amountGram": "1.0000",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "record failed: {body}");
        assert_eq!(body["eventHash"].as_str().unwrap().len(), 64);
        assert!(body.get("ledgerTxRef").is_none());
    }

    let (status, body) = get(&format!("{base}/events/DGC-1")).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"]["from"], "a");
    assert_eq!(events[1]["event"]["from"], "b");

    // Unknown certificates have empty timelines, not 404s.
    let (status, body) = get(&format!("{base}/events/DGC-unknown")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn split_event_lands_in_both_timelines() {
    let base = spawn_ledger().await;

    let (status, _) = post(
        &format!("{base}/events/record"),
        json!({
            "type": "SPLIT",
            "certId": "DGC-P",
            "occurredAt": "2026-01-01T00:00:00Z",
            "parentCertId": "DGC-P",
            "childCertId": "DGC-C",
            "from": "0xA",
            "to": "0xB",
            "amountChildGram": "1.2500",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    for cert in ["DGC-P", "DGC-C"] {
        let (_, body) = get(&format!("{base}/events/{cert}")).await;
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 1, "timeline of {cert}");
        assert_eq!(events[0]["event"]["type"], "SPLIT");
    }
}

#[tokio::test]
async fn record_rejects_malformed_events() {
    let base = spawn_ledger().await;

    let (status, body) = post(
        &format!("{base}/events/record"),
        json!({
            "type": "MERGED",
            "certId": "DGC-1",
            "occurredAt": "2026-01-01T00:00:00Z",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");

    let (status, body) = post(
        &format!("{base}/events/record"),
        json!({
            "type": "TRANSFER",
            "certId": "DGC-1",
            "occurredAt": "2026-01-01T00:00:00Z",
            "from": " ",
            "to": "b",
            "amountGram": "1.0000",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn chain_status_reports_unconfigured() {
    let base = spawn_ledger().await;
    let (status, body) = get(&format!("{base}/chain/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configured"], false);
}

#[tokio::test]
async fn authority_anchors_and_records_through_live_adapter() {
    let ledger_base = spawn_ledger().await;
    let cert_base = spawn_certificate(Some(ledger_base.clone())).await;

    let (status, body) = post(
        &format!("{cert_base}/certificates/issue"),
        json!({ "owner": "0xA", "amountGram": "2.0000", "purity": "999.9" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["anchorStatus"], "ANCHORED");
    assert_eq!(body["eventStatus"], "RECORDED");
    let cert_id = body["certificate"]["payload"]["certId"].as_str().unwrap();

    // The adapter holds the proof and the ISSUED event carries its hash.
    let (status, proof) = get(&format!("{ledger_base}/proofs/{cert_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let (_, timeline) = get(&format!("{ledger_base}/events/{cert_id}")).await;
    let events = timeline["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"]["type"], "ISSUED");
    assert_eq!(events[0]["event"]["proofHash"], proof["proof"]["proofHash"]);

    // The authority's timeline proxy mirrors the adapter.
    let (status, proxied) = get(&format!("{cert_base}/certificates/{cert_id}/timeline")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proxied["events"], timeline["events"]);
}

#[tokio::test]
async fn operation_sequence_matches_timeline_order() {
    let ledger_base = spawn_ledger().await;
    let cert_base = spawn_certificate(Some(ledger_base.clone())).await;

    let cert_id = issue_certificate(&cert_base, "0xA", "3.0000", "999.9").await;
    let (status, _) = post(
        &format!("{cert_base}/certificates/transfer"),
        json!({ "certId": cert_id, "toOwner": "0xB" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, split_body) = post(
        &format!("{cert_base}/certificates/split"),
        json!({ "parentCertId": cert_id, "toOwner": "0xC", "amountChildGram": "1.0000" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    common::set_certificate_status(&cert_base, &cert_id, "LOCKED").await;

    let (_, timeline) = get(&format!("{ledger_base}/events/{cert_id}")).await;
    let types: Vec<&str> = timeline["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["ISSUED", "TRANSFER", "SPLIT", "STATUS_CHANGED"]);

    // The split is also present under the child.
    let child_id = split_body["child"]["payload"]["certId"].as_str().unwrap();
    let (_, child_timeline) = get(&format!("{ledger_base}/events/{child_id}")).await;
    let child_events = child_timeline["events"].as_array().unwrap();
    assert_eq!(child_events.len(), 1);
    assert_eq!(child_events[0]["event"]["type"], "SPLIT");
}
