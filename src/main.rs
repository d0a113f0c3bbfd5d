//! reliable-tx command line driver
//!
//! Submits a transfer through the submission engine and prints the final
//! user-visible state. Useful for exercising an RPC setup end to end.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::{pubkey::Pubkey, signature::Signature, system_instruction};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reliable_tx::config::{Config, MonitoringConfig};
use reliable_tx::metrics::metrics;
use reliable_tx::observability::CorrelationId;
use reliable_tx::rpc_manager::{LedgerRpc, RpcLedger};
use reliable_tx::submission::{
    Outcome, PreconditionResolver, ResourceDependency, SubmissionEngine, TransactionRequest,
};
use reliable_tx::wallet::{SigningProvider, WalletManager};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transfer lamports to another account
    Transfer {
        #[arg(long)]
        to: Pubkey,
        #[arg(long)]
        lamports: u64,
    },

    /// Transfer SPL tokens between associated token accounts
    TokenTransfer {
        #[arg(long)]
        mint: Pubkey,
        #[arg(long)]
        to: Pubkey,
        /// Amount in base units
        #[arg(long)]
        amount: u64,
        /// Create the recipient's token account in the same transaction if missing
        #[arg(long)]
        create_recipient: bool,
    },

    /// Look up the status of a signature
    Status {
        #[arg(long)]
        signature: Signature,
    },

    /// Print the Prometheus metrics of this process
    Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(args.verbose, args.json_logs || config.monitoring.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting reliable-tx");

    let ledger = Arc::new(RpcLedger::new(&config.rpc).context("Failed to build RPC ledger")?);
    if config.rpc.warmup && !matches!(args.command, Command::Metrics) {
        ledger.spawn_warmup();
    }
    info!(endpoints = config.rpc.endpoints.len(), pool_size = config.rpc.pool_size, "RPC ledger ready");

    let engine = SubmissionEngine::new(ledger.clone()).with_poll_schedule(config.confirm);
    // Requests of this run share its id as a prefix
    let run_id = CorrelationId::new();

    match args.command {
        Command::Transfer { to, lamports } => {
            let wallet = load_wallet(&config)?;
            let instruction = system_instruction::transfer(&wallet.pubkey(), &to, lamports);
            let request = TransactionRequest::new(vec![instruction], wallet)
                .with_config(config.submit.clone())
                .with_correlation_id(run_id.child("transfer"));
            report(engine.submit(request).await);
            report_metrics(&config.monitoring)?;
        }
        Command::TokenTransfer {
            mint,
            to,
            amount,
            create_recipient,
        } => {
            let wallet = load_wallet(&config)?;
            let owner = wallet.pubkey();
            let source = ResourceDependency::token_account(owner, mint);
            let recipient = ResourceDependency::token_account(to, mint);

            let instruction = spl_token::instruction::transfer(
                &spl_token::id(),
                &source.address(),
                &recipient.address(),
                &owner,
                &[],
                amount,
            )
            .context("Failed to build token transfer instruction")?;

            let resolver = PreconditionResolver::new(ledger.clone(), create_recipient)
                .with_strength(config.submit.commitment);
            let request = TransactionRequest::new(vec![instruction], wallet)
                .with_config(config.submit.clone())
                .with_correlation_id(run_id.child("token-transfer"));
            let request = match resolver.prepend_creations(request, &[recipient]).await {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Precondition check failed");
                    println!("{} rejected: {}", timestamp(), e.cause());
                    return Ok(());
                }
            };
            report(engine.submit(request).await);
            report_metrics(&config.monitoring)?;
        }
        Command::Status { signature } => {
            let statuses = ledger
                .signature_statuses(&[signature])
                .await
                .context("Failed to query signature status")?;
            match statuses.into_iter().next().flatten() {
                Some(state) => println!(
                    "{} {signature}: slot {} {} {}",
                    timestamp(),
                    state.slot,
                    state
                        .confirmation
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string()),
                    state.err.map(|e| format!("failed: {e}")).unwrap_or_else(|| "ok".to_string()),
                ),
                None => println!("{} {signature}: not found", timestamp()),
            }
        }
        Command::Metrics => match metrics_report(&config.monitoring)? {
            Some(text) => println!("{text}"),
            None => println!("{} metrics are disabled (monitoring.enable_metrics = false)", timestamp()),
        },
    }

    info!(pool = ?ledger.pool_stats(), "Final pool statistics");
    Ok(())
}

/// Prometheus text of this process, or `None` when metrics are disabled
fn metrics_report(monitoring: &MonitoringConfig) -> Result<Option<String>> {
    if !monitoring.enable_metrics {
        return Ok(None);
    }
    metrics().render().map(Some).context("Failed to render metrics")
}

/// Dump the metrics of a finished submission to stderr, keeping stdout for the result
fn report_metrics(monitoring: &MonitoringConfig) -> Result<()> {
    if let Some(text) = metrics_report(monitoring)? {
        eprintln!("{text}");
    }
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "reliable_tx=debug,info"
    } else {
        "reliable_tx=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let initialized = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    initialized.context("Failed to initialize logging")?;

    Ok(())
}

fn load_wallet(config: &Config) -> Result<Arc<dyn SigningProvider>> {
    let path = config.wallet.resolved_keypair_path();
    let wallet = WalletManager::from_file(&path)
        .with_context(|| format!("Failed to load wallet from {}", path.display()))?;
    info!(wallet = %wallet.pubkey(), "Wallet loaded");
    Ok(Arc::new(wallet))
}

fn report(result: Result<Outcome, reliable_tx::TerminalFailure>) {
    match result {
        Ok(outcome) => println!("{} {}", timestamp(), outcome.summary()),
        Err(failure) => {
            println!("{} {}", timestamp(), failure.summary());
            if failure.may_have_landed() {
                warn!(signature = ?failure.signature, "Transaction may still land; check its status later");
            }
        }
    }
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
