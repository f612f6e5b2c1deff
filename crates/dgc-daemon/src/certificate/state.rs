//! Shared state of the certificate authority.

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use dgc_core::crypto::{self, CryptoError};

use crate::auth::ServiceAuth;
use crate::clients::HttpClient;
use crate::config::CertificateConfig;

use super::store::{CertificateStore, StoreError};

/// Startup failures of the certificate authority.
#[derive(Debug, Error)]
pub enum CertificateInitError {
    /// The store could not be opened.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// The issuer secret key is not valid Ed25519 key material.
    #[error("issuer key: {0}")]
    IssuerKey(#[from] CryptoError),

    /// The outbound HTTP client could not be constructed.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Process-scoped state: store handle, issuer key material, trust fabric,
/// and the ledger adapter endpoint.
#[derive(Debug)]
pub struct CertificateState {
    /// The certificate store.
    pub store: CertificateStore,
    /// Service-token gate for write endpoints.
    pub auth: ServiceAuth,
    /// Ledger adapter base URL; hops are SKIPPED without it.
    pub ledger_url: Option<String>,
    /// Outbound HTTP client.
    pub http: HttpClient,
    /// Issuer public key, hex, embedded in every payload.
    pub issuer_public: String,
    issuer_secret: SecretString,
}

impl CertificateState {
    /// Builds state from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateInitError`] when the store, key material, or
    /// HTTP client fails to initialize.
    pub fn from_config(config: &CertificateConfig) -> Result<Self, CertificateInitError> {
        let store = CertificateStore::open(&config.db_path)?;
        Self::new(
            store,
            config.issuer_secret_hex.clone(),
            config.common.service_token.clone(),
            config.ledger_adapter_url.clone(),
        )
    }

    /// Builds state from parts; tests use this with an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateInitError`] when the issuer key is invalid or
    /// the HTTP client fails to build.
    pub fn new(
        store: CertificateStore,
        issuer_secret: SecretString,
        service_token: Option<SecretString>,
        ledger_url: Option<String>,
    ) -> Result<Self, CertificateInitError> {
        let issuer_public = crypto::derive_public_key(issuer_secret.expose_secret())?;
        Ok(Self {
            store,
            auth: ServiceAuth::new(service_token.clone()),
            ledger_url,
            http: HttpClient::new(service_token)?,
            issuer_public,
            issuer_secret,
        })
    }

    /// The issuer secret key, hex. Read at init, never logged.
    #[must_use]
    pub fn issuer_secret_hex(&self) -> &str {
        self.issuer_secret.expose_secret()
    }
}
