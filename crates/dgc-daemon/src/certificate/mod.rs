//! Certificate authority (service D).
//!
//! Canonicalize, sign, persist; enforce the lifecycle state machine;
//! perform amount-conserving splits; request proof anchors and lineage
//! event writes from the ledger adapter.

mod routes;
mod state;
mod store;

pub use routes::router;
pub use state::{CertificateInitError, CertificateState};
pub use store::{CertificateStore, StoreError};
