//! Marketplace escrow engine (service H).
//!
//! Durable listing state machine with idempotent escrow operations,
//! two-phase settlement with rollback, freeze gating, dispute hand-off, and
//! audit fan-out to the risk engine.

mod routes;
mod store;

pub use routes::{router, MarketplaceState, IDEMPOTENCY_HEADER};
pub use store::{MarketplaceStore, StoreError};
