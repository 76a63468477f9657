//! Pairguard - New-Pair Triage Bot for EVM DEXes
//!
//! Audits freshly listed tokens through a two-stage pipeline and watches the
//! pools of survivors for price targets and rug pulls.

mod adapters;
mod application;
mod audit;
mod config;
mod domain;
mod ports;
mod price;

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ethers::types::Address;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing_subscriber::{fmt, EnvFilter};

use crate::adapters::cli::{AuditCmd, CliApp, Command, PriceCmd, RunCmd};
use crate::adapters::discovery::spawn_stdin_feed;
use crate::adapters::evm::{EvmClient, EvmClientFactory};
use crate::adapters::goplus::GoPlusClient;
use crate::adapters::mythril::MythrilScanner;
use crate::application::{AuditArchive, TriageOrchestrator};
use crate::config::{load_config, Config};
use crate::domain::candidate::{Candidate, CandidateConfig};
use crate::domain::verdict::AuditVerdict;
use crate::ports::scanner::{DeepScanner, HeuristicScanner};
use crate::price::PriceEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    init_logging(app.verbose, app.debug)?;

    match app.command {
        Command::Run(cmd) => run_command(cmd).await,
        Command::Audit(cmd) => audit_command(cmd).await,
        Command::Price(cmd) => price_command(cmd).await,
    }
}

fn init_logging(verbose: bool, debug: bool) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

/// One rolling-minute budget shared by the audit scheduler and every GoPlus
/// HTTP call, so the external ceiling holds no matter who asks first.
fn shared_limiter(config: &Config) -> Arc<DefaultDirectRateLimiter> {
    let quota = NonZeroU32::new(config.audit.heuristic_calls_per_minute.max(1))
        .expect("max(1) is non-zero");
    Arc::new(RateLimiter::direct(Quota::per_minute(quota)))
}

async fn run_command(cmd: RunCmd) -> Result<()> {
    tracing::info!("Starting pairguard...");

    let config = load_config(&cmd.config).context("Failed to load configuration")?;

    let limiter = shared_limiter(&config);
    let goplus = GoPlusClient::new(config.goplus_config(), Arc::clone(&limiter))
        .context("Failed to create GoPlus client")?;
    let mythril = MythrilScanner::new(config.mythril_config());
    let factory = Arc::new(EvmClientFactory::new(config.chain_settings()));
    let archive =
        AuditArchive::new(&config.archive.dir).context("Failed to open audit archive")?;

    let orchestrator = TriageOrchestrator::with_limiter(
        factory,
        Arc::new(goplus),
        Arc::new(mythril),
        config.pipeline_config(),
        limiter,
        archive,
        config.orchestrator_config(),
    );

    // Discovery feed: one candidate JSON object per stdin line
    let feed = spawn_stdin_feed(64);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run(feed, shutdown_rx).await;
    tracing::info!("Pairguard stopped");
    Ok(())
}

async fn audit_command(cmd: AuditCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let token: Address = cmd.token.parse().context("Invalid token address")?;

    let goplus = GoPlusClient::new(config.goplus_config(), shared_limiter(&config))
        .context("Failed to create GoPlus client")?;
    let heuristic = goplus.check(cmd.chain, token).await;

    if cmd.heuristic_only {
        println!("{}", serde_json::to_string_pretty(&heuristic)?);
        return Ok(());
    }

    let verdict = if heuristic.success {
        let mythril = MythrilScanner::new(config.mythril_config());
        let deep = mythril.scan(cmd.chain, token).await;
        AuditVerdict::combined(heuristic, deep)
    } else {
        AuditVerdict::short_circuit(heuristic)
    };

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

async fn price_command(cmd: PriceCmd) -> Result<()> {
    let config = load_config(&cmd.config).context("Failed to load configuration")?;
    let chains = config.chain_settings();
    let Some(settings) = chains.get(&cmd.chain) else {
        bail!("Chain {} is not configured", cmd.chain);
    };

    let client = EvmClient::connect(&settings.ws_url, cmd.chain)
        .await
        .context("Failed to connect to chain")?;

    let candidate = Candidate::from_config(CandidateConfig {
        id: None,
        chain_id: cmd.chain,
        new_token: cmd.token.parse().context("Invalid token address")?,
        base_token: cmd.base.parse().context("Invalid base token address")?,
        pair_address: cmd.pool.parse().context("Invalid pool address")?,
        v3: cmd.v3,
        fee_tier: None,
        target_gain_bps: config.monitor.target_gain_bps,
        rug_floor_thousandths: config.monitor.rug_floor_thousandths,
    });

    let engine = PriceEngine::new(Arc::new(client), &candidate);
    let price = engine.price().await.context("Failed to read pool price")?;

    if cmd.v3 {
        println!("sqrtPriceX96: {price}");
    } else {
        println!("Price (base per token, 1e18 fixed point): {price}");
    }
    Ok(())
}
