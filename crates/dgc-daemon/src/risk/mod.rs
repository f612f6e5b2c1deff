//! Risk engine (service E).
//!
//! Append-only event ingestion, incremental recomputation of per-target
//! risk profiles, and edge-triggered alert emission.

mod routes;
pub mod scoring;
mod store;

pub use routes::{router, RiskState};
pub use store::{RiskStore, StoreError};
