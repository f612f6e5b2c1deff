//! dgc-daemon - digital gold certificate service backbone
//!
//! One binary, six services: each subcommand runs a single long-running
//! HTTP server owning its own local store. Cross-service coordination is
//! HTTP-only; collaborator URLs, store paths, secrets, and thresholds come
//! from the environment (see `config`), with `--port`/`--db-path` overrides
//! for local runs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use dgc_daemon::{certificate, config, dispute, ledger, marketplace, recon, risk};

/// dgc daemon - digital gold certificate services
#[derive(Parser, Debug)]
#[command(name = "dgc-daemon")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Which service to run.
    #[command(subcommand)]
    service: Service,

    /// Listen port (overrides PORT).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite path (overrides the service's *_DB_PATH variable).
    #[arg(long)]
    db_path: Option<String>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Service {
    /// Certificate authority: issue, verify, transfer, split, status.
    Certificate,
    /// Ledger adapter: proof anchors, timelines, chain sink.
    Ledger,
    /// Marketplace: listings and idempotent escrow operations.
    Marketplace,
    /// Risk engine: event ingestion and risk scoring.
    Risk,
    /// Reconciliation and freeze controller.
    Reconciliation,
    /// Dispute orchestrator.
    Dispute,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (name, port, router) = build_service(&cli)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(service = name, %addr, "dgc service listening");

    axum::serve(listener, router)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}

/// Loads the selected service's configuration and builds its router.
fn build_service(cli: &Cli) -> Result<(&'static str, u16, Router)> {
    match cli.service {
        Service::Certificate => {
            let cfg = config::CertificateConfig::load(cli.port, cli.db_path.clone())
                .context("certificate configuration")?;
            let state = certificate::CertificateState::from_config(&cfg)
                .context("certificate service init")?;
            Ok((
                "certificate-authority",
                cfg.common.port,
                certificate::router(Arc::new(state)),
            ))
        },
        Service::Ledger => {
            let cfg = config::LedgerConfig::load(cli.port).context("ledger configuration")?;
            let state =
                ledger::LedgerState::from_config(&cfg).context("ledger adapter init")?;
            Ok((
                "ledger-adapter",
                cfg.common.port,
                ledger::router(Arc::new(state)),
            ))
        },
        Service::Marketplace => {
            let cfg = config::MarketplaceConfig::load(cli.port, cli.db_path.clone())
                .context("marketplace configuration")?;
            let state = marketplace::MarketplaceState::from_config(&cfg)
                .context("marketplace service init")?;
            Ok((
                "marketplace",
                cfg.common.port,
                marketplace::router(Arc::new(state)),
            ))
        },
        Service::Risk => {
            let cfg = config::RiskConfig::load(cli.port, cli.db_path.clone())
                .context("risk configuration")?;
            let state = risk::RiskState::from_config(&cfg).context("risk engine init")?;
            Ok(("risk-engine", cfg.common.port, risk::router(Arc::new(state))))
        },
        Service::Reconciliation => {
            let cfg = config::ReconConfig::load(cli.port, cli.db_path.clone())
                .context("reconciliation configuration")?;
            let state =
                recon::ReconState::from_config(&cfg).context("reconciliation service init")?;
            Ok((
                "reconciliation",
                cfg.common.port,
                recon::router(Arc::new(state)),
            ))
        },
        Service::Dispute => {
            let cfg = config::DisputeConfig::load(cli.port, cli.db_path.clone())
                .context("dispute configuration")?;
            let state =
                dispute::DisputeState::from_config(&cfg).context("dispute service init")?;
            Ok(("dispute", cfg.common.port, dispute::router(Arc::new(state))))
        },
    }
}
