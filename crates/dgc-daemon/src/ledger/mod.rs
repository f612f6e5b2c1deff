//! Ledger adapter (service C) and the chain sink (component B).
//!
//! Keeps the latest proof anchor per certificate and an append-ordered
//! event timeline, optionally pushing each event through the chain sink and
//! fanning out to the risk engine.

mod book;
mod chain;
mod routes;

pub use book::{LedgerBook, RecordedEvent};
pub use chain::{actor_to_address, cert_id_to_bytes32, encode_event, ChainSink, ChainWriteError};
pub use routes::{router, LedgerState};
