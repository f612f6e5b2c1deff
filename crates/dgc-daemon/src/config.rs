//! Per-service configuration read once at startup.
//!
//! Only environment variables are observable at the process boundary; CLI
//! flags override the env for local runs. Secrets (service token, issuer
//! key, chain key) are wrapped in [`SecretString`] and never logged.

use secrecy::SecretString;
use thiserror::Error;

use dgc_core::amount::Amount;
use dgc_core::trust::{
    RoleSet, DEFAULT_DISPUTE_ASSIGN_ROLES, DEFAULT_DISPUTE_RESOLVE_ROLES, DEFAULT_UNFREEZE_ROLES,
};

/// Default listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Default risk alert threshold.
pub const DEFAULT_RISK_ALERT_THRESHOLD: u32 = 60;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is missing.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Variable name.
        name: &'static str,
    },

    /// A variable failed to parse.
    #[error("invalid value for {name}: {message}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Parse failure description.
        message: String,
    },
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env_opt(name).ok_or(ConfigError::Missing { name })
}

fn env_amount(name: &'static str, default: &str) -> Result<Amount, ConfigError> {
    let raw = env_opt(name).unwrap_or_else(|| default.to_string());
    Amount::parse(&raw).map_err(|e| ConfigError::Invalid {
        name,
        message: e.to_string(),
    })
}

/// Shared settings every service carries.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Listen port.
    pub port: u16,
    /// Shared service token; when set, write endpoints require it.
    pub service_token: Option<SecretString>,
}

impl CommonConfig {
    /// Loads `PORT` and `SERVICE_AUTH_TOKEN`, with an optional CLI port
    /// override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `PORT` is not a valid port.
    pub fn load(port_override: Option<u16>) -> Result<Self, ConfigError> {
        let port = match port_override {
            Some(p) => p,
            None => match env_opt("PORT") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    name: "PORT",
                    message: format!("'{raw}' is not a valid port"),
                })?,
                None => DEFAULT_PORT,
            },
        };
        Ok(Self {
            port,
            service_token: env_opt("SERVICE_AUTH_TOKEN").map(SecretString::from),
        })
    }
}

/// Certificate authority (service D) configuration.
#[derive(Debug, Clone)]
pub struct CertificateConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// SQLite path for the certificate store.
    pub db_path: String,
    /// Issuer Ed25519 secret key, hex. Required.
    pub issuer_secret_hex: SecretString,
    /// Ledger adapter base URL, when configured.
    pub ledger_adapter_url: Option<String>,
}

impl CertificateConfig {
    /// Loads the certificate service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `ISSUER_PRIVATE_KEY_HEX` is absent or the
    /// common settings fail to load.
    pub fn load(
        port_override: Option<u16>,
        db_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            db_path: db_override
                .or_else(|| env_opt("CERT_DB_PATH"))
                .unwrap_or_else(|| "dgc-certificates.db".to_string()),
            issuer_secret_hex: SecretString::from(env_required("ISSUER_PRIVATE_KEY_HEX")?),
            ledger_adapter_url: env_opt("LEDGER_ADAPTER_URL"),
        })
    }
}

/// Ledger adapter (service C) configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// Chain RPC URL; the sink is unconfigured without it.
    pub chain_rpc_url: Option<String>,
    /// Chain signer key, hex.
    pub chain_private_key: Option<SecretString>,
    /// On-chain registry contract address.
    pub registry_address: Option<String>,
    /// Risk engine base URL for event fan-out.
    pub risk_stream_url: Option<String>,
}

impl LedgerConfig {
    /// Loads the ledger adapter configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the common settings fail to load.
    pub fn load(port_override: Option<u16>) -> Result<Self, ConfigError> {
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            chain_rpc_url: env_opt("CHAIN_RPC_URL"),
            chain_private_key: env_opt("CHAIN_PRIVATE_KEY").map(SecretString::from),
            registry_address: env_opt("DGC_REGISTRY_ADDRESS"),
            risk_stream_url: env_opt("RISK_STREAM_URL"),
        })
    }
}

/// Marketplace (service H) configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// SQLite path for listings, audit, and idempotency records.
    pub db_path: String,
    /// Certificate authority base URL. Required for mutations.
    pub certificate_service_url: Option<String>,
    /// Reconciliation base URL; the freeze gate is skipped without it.
    pub reconciliation_service_url: Option<String>,
    /// Risk engine base URL for audit fan-out.
    pub risk_stream_url: Option<String>,
    /// Dispute service base URL.
    pub dispute_service_url: Option<String>,
}

impl MarketplaceConfig {
    /// Loads the marketplace configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the common settings fail to load.
    pub fn load(
        port_override: Option<u16>,
        db_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            db_path: db_override
                .or_else(|| env_opt("MARKETPLACE_DB_PATH"))
                .unwrap_or_else(|| "dgc-marketplace.db".to_string()),
            certificate_service_url: env_opt("CERTIFICATE_SERVICE_URL"),
            reconciliation_service_url: env_opt("RECONCILIATION_SERVICE_URL"),
            risk_stream_url: env_opt("RISK_STREAM_URL"),
            dispute_service_url: env_opt("DISPUTE_SERVICE_URL"),
        })
    }
}

/// Risk engine (service E) configuration.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// SQLite path for event logs, profiles, and alerts.
    pub db_path: String,
    /// Score at and above which alerts fire.
    pub alert_threshold: u32,
    /// Optional webhook notified on each new alert.
    pub alert_webhook_url: Option<String>,
}

impl RiskConfig {
    /// Loads the risk engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `RISK_ALERT_THRESHOLD` fails to parse or
    /// the common settings fail to load.
    pub fn load(
        port_override: Option<u16>,
        db_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let alert_threshold = match env_opt("RISK_ALERT_THRESHOLD") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "RISK_ALERT_THRESHOLD",
                message: format!("'{raw}' is not a valid score"),
            })?,
            None => DEFAULT_RISK_ALERT_THRESHOLD,
        };
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            db_path: db_override
                .or_else(|| env_opt("RISK_DB_PATH"))
                .unwrap_or_else(|| "dgc-risk.db".to_string()),
            alert_threshold,
            alert_webhook_url: env_opt("RISK_ALERT_WEBHOOK_URL"),
        })
    }
}

/// Reconciliation (service G) configuration.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// SQLite path for runs, the freeze singleton, and overrides.
    pub db_path: String,
    /// Certificate authority base URL. Required for runs.
    pub certificate_service_url: Option<String>,
    /// Risk engine base URL for reconciliation alerts.
    pub risk_stream_url: Option<String>,
    /// Default custody inventory when the run request carries none.
    pub custody_total_gram: Amount,
    /// Mismatch threshold that flips the freeze flag.
    pub mismatch_threshold_gram: Amount,
    /// Roles allowed to unfreeze.
    pub unfreeze_roles: RoleSet,
}

impl ReconConfig {
    /// Loads the reconciliation configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an amount variable fails to parse or the
    /// common settings fail to load.
    pub fn load(
        port_override: Option<u16>,
        db_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            db_path: db_override
                .or_else(|| env_opt("RECON_DB_PATH"))
                .unwrap_or_else(|| "dgc-reconciliation.db".to_string()),
            certificate_service_url: env_opt("CERTIFICATE_SERVICE_URL"),
            risk_stream_url: env_opt("RISK_STREAM_URL"),
            custody_total_gram: env_amount("CUSTODY_TOTAL_GRAM", "0")?,
            mismatch_threshold_gram: env_amount("RECON_MISMATCH_THRESHOLD_GRAM", "0.5000")?,
            unfreeze_roles: RoleSet::parse(
                &env_opt("RECON_UNFREEZE_ALLOWED_ROLES")
                    .unwrap_or_else(|| DEFAULT_UNFREEZE_ROLES.to_string()),
            ),
        })
    }
}

/// Dispute orchestrator (service F) configuration.
#[derive(Debug, Clone)]
pub struct DisputeConfig {
    /// Shared settings.
    pub common: CommonConfig,
    /// SQLite path for dispute records.
    pub db_path: String,
    /// Roles allowed to assign disputes.
    pub assign_roles: RoleSet,
    /// Roles allowed to resolve disputes.
    pub resolve_roles: RoleSet,
}

impl DisputeConfig {
    /// Loads the dispute orchestrator configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the common settings fail to load.
    pub fn load(
        port_override: Option<u16>,
        db_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            common: CommonConfig::load(port_override)?,
            db_path: db_override
                .or_else(|| env_opt("DISPUTE_DB_PATH"))
                .unwrap_or_else(|| "dgc-disputes.db".to_string()),
            assign_roles: RoleSet::parse(
                &env_opt("DISPUTE_ASSIGN_ALLOWED_ROLES")
                    .unwrap_or_else(|| DEFAULT_DISPUTE_ASSIGN_ROLES.to_string()),
            ),
            resolve_roles: RoleSet::parse(
                &env_opt("DISPUTE_RESOLVE_ALLOWED_ROLES")
                    .unwrap_or_else(|| DEFAULT_DISPUTE_RESOLVE_ROLES.to_string()),
            ),
        })
    }
}
