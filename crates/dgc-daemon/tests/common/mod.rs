//! Shared helpers for service integration tests.
//!
//! Each test spins real axum servers on ephemeral loopback ports and talks
//! to them over HTTP, so cross-service coordination (freeze gates, escrow
//! transitions, fan-out) is exercised end-to-end.

#![allow(dead_code)]

use axum::Router;
use reqwest::StatusCode;
use secrecy::SecretString;
use serde_json::Value;

use dgc_daemon::certificate::{CertificateState, CertificateStore};

/// Deterministic issuer secret used across tests (RFC 8032 test vector key).
pub const ISSUER_SK: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

/// Serves a router on an ephemeral loopback port, returning its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server task");
    });
    format!("http://{addr}")
}

/// A certificate authority on an in-memory store, optionally wired to a
/// ledger adapter.
pub fn certificate_state(ledger_url: Option<String>) -> CertificateState {
    CertificateState::new(
        CertificateStore::open_in_memory().expect("in-memory store"),
        SecretString::from(ISSUER_SK.to_string()),
        None,
        ledger_url,
    )
    .expect("certificate state")
}

/// Spawns a certificate authority service, returning its base URL.
pub async fn spawn_certificate(ledger_url: Option<String>) -> String {
    let state = certificate_state(ledger_url);
    spawn(dgc_daemon::certificate::router(std::sync::Arc::new(state))).await
}

/// POSTs JSON and returns status plus parsed body.
pub async fn post(url: &str, body: Value) -> (StatusCode, Value) {
    post_with_headers(url, body, &[]).await
}

/// POSTs JSON with extra headers and returns status plus parsed body.
pub async fn post_with_headers(
    url: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let client = reqwest::Client::new();
    let mut request = client.post(url).json(&body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request.send().await.expect("post request");
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// GETs JSON and returns status plus parsed body.
pub async fn get(url: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await
        .expect("get request");
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// Issues a certificate against a running authority and returns its id.
pub async fn issue_certificate(base: &str, owner: &str, amount: &str, purity: &str) -> String {
    let (status, body) = post(
        &format!("{base}/certificates/issue"),
        serde_json::json!({ "owner": owner, "amountGram": amount, "purity": purity }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "issue failed: {body}");
    body["certificate"]["payload"]["certId"]
        .as_str()
        .expect("certId in issue response")
        .to_string()
}

/// Moves a certificate to the given status against a running authority.
pub async fn set_certificate_status(base: &str, cert_id: &str, status: &str) {
    let (code, body) = post(
        &format!("{base}/certificates/status"),
        serde_json::json!({ "certId": cert_id, "status": status }),
    )
    .await;
    assert_eq!(code, StatusCode::OK, "status change failed: {body}");
}
