//! Chain sink: deterministic event encoding and the JSON-RPC writer.
//!
//! The encodings here are part of the external contract with the chain:
//!
//! - canonical amounts map to integer-scaled values (x 10 000)
//! - purity maps to basis points (`999.9` -> `9999`)
//! - statuses map to codes `ACTIVE=0, LOCKED=1, REDEEMED=2, REVOKED=3`
//! - a non-hex certId collapses to 32 bytes via `keccak256(utf8(certId))`
//! - a non-hex-address actor collapses to the last 20 bytes of
//!   `keccak256(utf8(actor))`
//!
//! Once a certId is anchored on chain its hashed form is the canonical
//! on-chain identity.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use dgc_core::amount::purity_basis_points;
use dgc_core::event::LedgerEvent;

use crate::clients::{HttpClient, FANOUT_DEADLINE, PRIMARY_DEADLINE};

/// Chain submission failures. Record requests surface these as 502
/// `chain_write_failed` and do not persist the event locally.
#[derive(Debug, Error)]
pub enum ChainWriteError {
    /// The RPC endpoint could not be reached before the deadline.
    #[error("chain rpc unreachable: {0}")]
    Unreachable(String),

    /// The RPC endpoint answered with a non-success status or an error body.
    #[error("chain rpc rejected: {0}")]
    Rejected(String),

    /// The event cannot be encoded for the chain.
    #[error("chain encoding failed: {0}")]
    Encoding(String),
}

/// Keccak-256 digest.
fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Collapses a certificate id to its 32-byte on-chain identity.
///
/// A 64-hex-digit id (with optional `0x` prefix) decodes directly;
/// anything else hashes through Keccak-256.
#[must_use]
pub fn cert_id_to_bytes32(cert_id: &str) -> [u8; 32] {
    let stripped = cert_id.strip_prefix("0x").unwrap_or(cert_id);
    if stripped.len() == 64 {
        if let Ok(raw) = hex::decode(stripped) {
            if let Ok(fixed) = raw.try_into() {
                return fixed;
            }
        }
    }
    keccak256(cert_id.as_bytes())
}

/// Collapses an actor identity to a 20-byte address.
///
/// A 40-hex-digit address (with optional `0x` prefix) decodes directly;
/// anything else takes the last 20 bytes of its Keccak-256 hash.
#[must_use]
pub fn actor_to_address(actor: &str) -> [u8; 20] {
    let stripped = actor.strip_prefix("0x").unwrap_or(actor);
    if stripped.len() == 40 {
        if let Ok(raw) = hex::decode(stripped) {
            if let Ok(fixed) = raw.try_into() {
                return fixed;
            }
        }
    }
    let digest = keccak256(actor.as_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Encodes a lineage event into the flat parameter object submitted to the
/// registry.
///
/// # Errors
///
/// Returns [`ChainWriteError::Encoding`] when the purity field is malformed.
pub fn encode_event(event: &LedgerEvent) -> Result<Value, ChainWriteError> {
    let cert_id = hex0x(&cert_id_to_bytes32(event.cert_id()));
    let params = match event {
        LedgerEvent::Issued {
            owner,
            amount_gram,
            purity,
            ..
        } => json!({
            "eventType": "ISSUED",
            "certId": cert_id,
            "owner": hex0x(&actor_to_address(owner)),
            "amount": amount_gram.scaled(),
            "purityBp": purity_basis_points(purity)
                .map_err(|e| ChainWriteError::Encoding(e.to_string()))?,
        }),
        LedgerEvent::Transfer {
            from,
            to,
            amount_gram,
            price,
            ..
        } => json!({
            "eventType": "TRANSFER",
            "certId": cert_id,
            "from": hex0x(&actor_to_address(from)),
            "to": hex0x(&actor_to_address(to)),
            "amount": amount_gram.scaled(),
            "price": price.as_ref().map(|p| p.scaled()),
        }),
        LedgerEvent::Split {
            parent_cert_id,
            child_cert_id,
            from,
            to,
            amount_child_gram,
            ..
        } => json!({
            "eventType": "SPLIT",
            "certId": cert_id,
            "parentCertId": hex0x(&cert_id_to_bytes32(parent_cert_id)),
            "childCertId": hex0x(&cert_id_to_bytes32(child_cert_id)),
            "from": hex0x(&actor_to_address(from)),
            "to": hex0x(&actor_to_address(to)),
            "amountChild": amount_child_gram.scaled(),
        }),
        LedgerEvent::StatusChanged { status, .. } => json!({
            "eventType": "STATUS_CHANGED",
            "certId": cert_id,
            "statusCode": status.chain_code(),
        }),
    };
    Ok(params)
}

/// The configured chain writer.
#[derive(Debug, Clone)]
pub struct ChainSink {
    rpc_url: String,
    registry_address: Option<String>,
    signer_address: String,
    http: HttpClient,
}

impl ChainSink {
    /// Builds a sink when an RPC URL is configured; `None` otherwise.
    ///
    /// The signer address is derived from the configured private key by the
    /// same collapse rule used for non-hex actors; that derivation is the
    /// sink's local identity, not a curve operation.
    ///
    /// # Errors
    ///
    /// Returns the HTTP client builder error.
    pub fn from_parts(
        rpc_url: Option<String>,
        private_key: Option<&SecretString>,
        registry_address: Option<String>,
        http: HttpClient,
    ) -> Result<Option<Self>, reqwest::Error> {
        let Some(rpc_url) = rpc_url else {
            return Ok(None);
        };
        let signer_address = private_key
            .map(|key| hex0x(&actor_to_address(key.expose_secret())))
            .unwrap_or_default();
        Ok(Some(Self {
            rpc_url,
            registry_address,
            signer_address,
            http,
        }))
    }

    /// Submits an event to the registry. Returns the transaction reference.
    ///
    /// # Errors
    ///
    /// Returns [`ChainWriteError`] on transport failure, an RPC error body,
    /// or a missing result.
    pub async fn submit(&self, event: &LedgerEvent) -> Result<String, ChainWriteError> {
        let mut params = encode_event(event)?;
        if let Some(registry) = &self.registry_address {
            params["registry"] = Value::String(registry.clone());
        }
        if !self.signer_address.is_empty() {
            params["signer"] = Value::String(self.signer_address.clone());
        }
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "dgc_recordEvent",
            "params": [params],
        });

        let response = self
            .http
            .post_json(&self.rpc_url, &request, PRIMARY_DEADLINE)
            .await
            .map_err(|e| ChainWriteError::Unreachable(e.to_string()))?;

        if !response.is_success() {
            return Err(ChainWriteError::Rejected(format!(
                "status {}",
                response.status
            )));
        }
        if let Some(error) = response.body.get("error") {
            return Err(ChainWriteError::Rejected(error.to_string()));
        }
        response
            .body
            .get("result")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChainWriteError::Rejected("missing result".to_string()))
    }

    /// Reports the sink configuration plus a best-effort block height probe.
    pub async fn status(&self) -> Value {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_blockNumber",
            "params": [],
        });
        let mut status = json!({
            "configured": true,
            "rpcUrl": self.rpc_url,
            "registryAddress": self.registry_address,
            "signerAddress": self.signer_address,
        });
        match self.http.post_json(&self.rpc_url, &request, FANOUT_DEADLINE).await {
            Ok(response) if response.is_success() => {
                if let Some(block) = response.body.get("result") {
                    status["latestBlock"] = block.clone();
                }
            },
            Ok(response) => {
                status["error"] = Value::String(format!("rpc status {}", response.status));
            },
            Err(e) => {
                status["error"] = Value::String(e.to_string());
            },
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgc_core::amount::Amount;

    #[test]
    fn hex_cert_id_decodes_directly() {
        let raw = "ab".repeat(32);
        assert_eq!(cert_id_to_bytes32(&raw), [0xabu8; 32]);
        assert_eq!(cert_id_to_bytes32(&format!("0x{raw}")), [0xabu8; 32]);
    }

    #[test]
    fn non_hex_cert_id_hashes_deterministically() {
        let a = cert_id_to_bytes32("DGC-20260101T000000000Z-abcd1234");
        let b = cert_id_to_bytes32("DGC-20260101T000000000Z-abcd1234");
        assert_eq!(a, b);
        assert_ne!(a, cert_id_to_bytes32("DGC-other"));
    }

    #[test]
    fn hex_actor_decodes_directly() {
        let raw = "cd".repeat(20);
        assert_eq!(actor_to_address(&raw), [0xcdu8; 20]);
        assert_eq!(actor_to_address(&format!("0x{raw}")), [0xcdu8; 20]);
    }

    #[test]
    fn non_hex_actor_takes_keccak_tail() {
        let address = actor_to_address("alice");
        let digest = keccak256(b"alice");
        assert_eq!(address[..], digest[12..]);
    }

    #[test]
    fn encode_maps_amount_purity_and_status() {
        let event = LedgerEvent::Issued {
            cert_id: "DGC-1".into(),
            occurred_at: "2026-01-01T00:00:00Z".into(),
            proof_hash: None,
            owner: "alice".into(),
            amount_gram: Amount::parse("1.2500").unwrap(),
            purity: "999.9".into(),
        };
        let params = encode_event(&event).unwrap();
        assert_eq!(params["amount"], 12_500);
        assert_eq!(params["purityBp"], 9999);

        let status_event = LedgerEvent::StatusChanged {
            cert_id: "DGC-1".into(),
            occurred_at: "2026-01-01T00:00:00Z".into(),
            proof_hash: None,
            status: dgc_core::certificate::CertificateStatus::Locked,
        };
        let params = encode_event(&status_event).unwrap();
        assert_eq!(params["statusCode"], 1);
    }

    #[test]
    fn encode_split_carries_both_identities() {
        let event = LedgerEvent::Split {
            cert_id: "DGC-P".into(),
            occurred_at: "2026-01-01T00:00:00Z".into(),
            proof_hash: None,
            parent_cert_id: "DGC-P".into(),
            child_cert_id: "DGC-C".into(),
            from: "0xA".into(),
            to: "0xB".into(),
            amount_child_gram: Amount::parse("1").unwrap(),
        };
        let params = encode_event(&event).unwrap();
        assert_eq!(params["parentCertId"], params["certId"]);
        assert_ne!(params["childCertId"], params["parentCertId"]);
        assert_eq!(params["amountChild"], 10_000);
    }
}
