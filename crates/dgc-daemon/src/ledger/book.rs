//! In-memory proof anchor store and per-certificate event timelines.
//!
//! The adapter keeps one latest anchor per certificate and an append-ordered
//! event list per certificate. Split events appear in both the parent and
//! child timelines at the same logical position.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use dgc_core::event::{LedgerEvent, ProofAnchor};

/// A recorded event with its canonical hash and optional chain reference.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedEvent {
    /// The lineage event.
    pub event: LedgerEvent,
    /// SHA-256 hex of the canonical JSON of the event.
    pub event_hash: String,
    /// Transaction reference from the chain sink, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_tx_ref: Option<String>,
}

/// The adapter's in-memory state.
#[derive(Debug, Default)]
pub struct LedgerBook {
    proofs: RwLock<HashMap<String, ProofAnchor>>,
    timelines: RwLock<HashMap<String, Vec<RecordedEvent>>>,
}

impl LedgerBook {
    /// Stores (overwriting) the latest anchor for a certificate.
    pub fn put_proof(&self, anchor: ProofAnchor) {
        self.proofs
            .write()
            .expect("proof lock poisoned")
            .insert(anchor.cert_id.clone(), anchor);
    }

    /// The latest anchor for a certificate.
    #[must_use]
    pub fn get_proof(&self, cert_id: &str) -> Option<ProofAnchor> {
        self.proofs
            .read()
            .expect("proof lock poisoned")
            .get(cert_id)
            .cloned()
    }

    /// Appends a recorded event to its certificate timeline; split events
    /// also land under the child certificate.
    pub fn append(&self, recorded: RecordedEvent) {
        let mut timelines = self.timelines.write().expect("timeline lock poisoned");
        timelines
            .entry(recorded.event.cert_id().to_string())
            .or_default()
            .push(recorded.clone());
        if let Some(child) = recorded.event.child_cert_id() {
            if child != recorded.event.cert_id() {
                timelines
                    .entry(child.to_string())
                    .or_default()
                    .push(recorded);
            }
        }
    }

    /// The ordered timeline of a certificate; empty when unknown.
    #[must_use]
    pub fn timeline(&self, cert_id: &str) -> Vec<RecordedEvent> {
        self.timelines
            .read()
            .expect("timeline lock poisoned")
            .get(cert_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgc_core::amount::Amount;

    fn transfer(cert_id: &str, from: &str, to: &str) -> RecordedEvent {
        RecordedEvent {
            event: LedgerEvent::Transfer {
                cert_id: cert_id.into(),
                occurred_at: "2026-01-01T00:00:00Z".into(),
                proof_hash: None,
                from: from.into(),
                to: to.into(),
                amount_gram: Amount::parse("1").unwrap(),
                price: None,
            },
            event_hash: format!("hash-{from}-{to}"),
            ledger_tx_ref: None,
        }
    }

    #[test]
    fn proof_overwrites_latest() {
        let book = LedgerBook::default();
        book.put_proof(ProofAnchor::derive("DGC-1", "h1", "t0", "t1").unwrap());
        book.put_proof(ProofAnchor::derive("DGC-1", "h2", "t2", "t3").unwrap());
        let proof = book.get_proof("DGC-1").unwrap();
        assert_eq!(proof.payload_hash, "h2");
        assert!(book.get_proof("DGC-404").is_none());
    }

    #[test]
    fn timeline_preserves_arrival_order() {
        let book = LedgerBook::default();
        book.append(transfer("DGC-1", "a", "b"));
        book.append(transfer("DGC-1", "b", "c"));
        let events = book.timeline("DGC-1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_hash, "hash-a-b");
        assert_eq!(events[1].event_hash, "hash-b-c");
        assert!(book.timeline("DGC-404").is_empty());
    }

    #[test]
    fn split_lands_in_both_timelines() {
        let book = LedgerBook::default();
        let recorded = RecordedEvent {
            event: LedgerEvent::Split {
                cert_id: "DGC-P".into(),
                occurred_at: "2026-01-01T00:00:00Z".into(),
                proof_hash: None,
                parent_cert_id: "DGC-P".into(),
                child_cert_id: "DGC-C".into(),
                from: "a".into(),
                to: "b".into(),
                amount_child_gram: Amount::parse("1").unwrap(),
            },
            event_hash: "split-hash".into(),
            ledger_tx_ref: None,
        };
        book.append(recorded);
        assert_eq!(book.timeline("DGC-P").len(), 1);
        assert_eq!(book.timeline("DGC-C").len(), 1);
        assert_eq!(
            book.timeline("DGC-P")[0].event_hash,
            book.timeline("DGC-C")[0].event_hash
        );
    }
}
