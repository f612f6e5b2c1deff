//! dgc-daemon - DGC service backbone library
//!
//! This library provides the six HTTP services of the digital gold
//! certificate backbone. Each service owns its local store and exposes an
//! axum router; cross-service reads and writes go over HTTP through the
//! typed clients in [`clients`].
//!
//! # Modules
//!
//! - [`certificate`]: certificate authority (issue, verify, transfer, split)
//! - [`ledger`]: proof anchors, lineage timelines, and the chain sink
//! - [`marketplace`]: escrowed listing state machine with idempotent writes
//! - [`risk`]: event ingestion and incremental risk scoring
//! - [`recon`]: custody reconciliation and the freeze controller
//! - [`dispute`]: dispute lifecycle orchestration
//! - [`auth`]: shared-secret service gate and governance RBAC
//! - [`clients`]: outbound HTTP with bounded deadlines

pub mod auth;
pub mod certificate;
pub mod clients;
pub mod config;
pub mod dispute;
pub mod http;
pub mod ledger;
pub mod marketplace;
pub mod recon;
pub mod risk;
