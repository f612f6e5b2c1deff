//! # dgc-core
//!
//! Domain library for the digital gold certificate (DGC) backbone.
//!
//! This crate provides the pure building blocks shared by every DGC service:
//!
//! - **Canonical JSON**: RFC 8785 (JCS) serialization so independently
//!   computed hashes agree across services
//! - **Crypto primitives**: SHA-256 hex digests and Ed25519 sign/verify over
//!   raw 32-byte keys
//! - **Amounts**: fixed-point gram arithmetic scaled by 10 000, never floats
//! - **Lifecycle state machines**: certificate, listing, and dispute status
//!   transitions with explicit allowed-successor checks
//! - **Wire types**: ledger events, proof anchors, marketplace listings,
//!   reconciliation runs, risk profiles, and the trust-fabric role sets
//!
//! Nothing in this crate performs I/O; services in `dgc-daemon` compose these
//! primitives behind their HTTP surfaces.
//!
//! ## Example
//!
//! ```
//! use dgc_core::amount::Amount;
//! use dgc_core::certificate::{CertificateStatus, GoldCertificate};
//! use dgc_core::crypto::derive_public_key;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sk = "1f".repeat(32);
//! let issuer = derive_public_key(&sk)?;
//! let cert = GoldCertificate::new(
//!     "DGC-TEST-1".into(),
//!     issuer,
//!     "0xA".into(),
//!     Amount::parse("1.25")?,
//!     "999.9".into(),
//! );
//! assert_eq!(cert.status, CertificateStatus::Active);
//! assert_eq!(cert.amount_gram.to_string(), "1.2500");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod amount;
pub mod canonical;
pub mod certificate;
pub mod crypto;
pub mod dispute;
pub mod event;
pub mod listing;
pub mod recon;
pub mod risk;
pub mod trust;

pub use amount::Amount;
pub use certificate::{CertificateStatus, GoldCertificate, SignedCertificate};
pub use event::{LedgerEvent, ProofAnchor};
pub use listing::{ListingStatus, MarketplaceListing};
