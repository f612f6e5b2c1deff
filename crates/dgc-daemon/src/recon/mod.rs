//! Reconciliation and freeze controller (service G).
//!
//! Periodic custody-vs-claims checks, auto-freeze on threshold breach, and
//! governance-audited manual override.

mod routes;
mod store;

pub use routes::{router, ReconState};
pub use store::{ReconStore, StoreError};
