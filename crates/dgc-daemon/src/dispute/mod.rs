//! Dispute orchestrator (service F).
//!
//! Persistent OPEN -> ASSIGNED -> RESOLVED state machine with governance
//! RBAC on assign and resolve.

mod routes;
mod store;

pub use routes::{router, DisputeState};
pub use store::{DisputeStore, StoreError};
