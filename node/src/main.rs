// Copyright (c) 2026 Valocracy Contributors. MIT License.
// See LICENSE for details.

//! # Valocracy Node
//!
//! Entry point for the `valocracy-node` binary. Parses CLI arguments,
//! initializes logging, and either applies one transaction to the persisted
//! deployment or serves the read-only HTTP API and metrics endpoint.
//!
//! Mutating subcommands print their receipt as JSON on stdout. A reverted
//! transaction prints nothing on stdout, logs the failure, and exits with a
//! non-zero status.

mod api;
mod cli;
mod logging;
mod metrics;
mod store;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;

use valocracy_contracts::asset::FungibleAsset;
use valocracy_contracts::valocracy::ValocracyError;
use valocracy_contracts::{ContractError, Deployment};
use valocracy_protocol::config::PROTOCOL_VERSION;
use valocracy_protocol::identity::Address;

use cli::{Commands, ValocracyNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;
use store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ValocracyNodeCli::parse();

    if let Commands::Version = cli.command {
        print_version();
        return Ok(());
    }

    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&cli.log_format));
    let store = Store::open(&cli.data_dir)?;

    match cli.command {
        Commands::Init(args) => {
            let deployment = store.init(args.owner)?;
            tracing::info!(owner = %args.owner, "deployment initialized");
            print_json(&summary(&deployment))
        }
        Commands::Define(args) => execute(&store, |d| {
            d.set_valor(args.caller, args.id, args.rarity, args.metadata)
        }),
        Commands::Issue(args) => execute(&store, |d| d.issue(args.caller, args.to, args.valor)),
        Commands::Burn(args) => execute(&store, |d| d.burn(args.caller, args.token_id)),
        Commands::MintAsset(args) => {
            execute(&store, |d| d.mint_asset(args.caller, args.to, args.amount))
        }
        Commands::Fund(args) => execute(&store, |d| {
            let treasury = resolve_treasury(d, args.treasury)?;
            d.fund(args.caller, treasury, args.amount)
        }),
        Commands::Redeem(args) => {
            let holder = args.holder.unwrap_or(args.caller);
            execute(&store, |d| {
                let treasury = resolve_treasury(d, args.treasury)?;
                match (args.amount, args.shares) {
                    (_, Some(shares)) => d.redeem_shares(args.caller, treasury, holder, shares),
                    (amount, None) => {
                        d.redeem(args.caller, treasury, holder, amount.unwrap_or_default())
                    }
                }
            })
        }
        Commands::SetTreasury(args) => {
            execute(&store, |d| d.set_treasury(args.caller, args.treasury))
        }
        Commands::Status => print_json(&summary(&store.load()?)),
        Commands::Events(args) => print_json(&store.events_since(args.since, args.limit)?),
        Commands::Serve(args) => serve(store, args).await,
        Commands::Version => Ok(()),
    }
}

/// Applies one transaction and prints its receipt.
fn execute<T, F>(store: &Store, op: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&mut Deployment) -> Result<T, ContractError>,
{
    match store.apply(op)? {
        Ok(receipt) => print_json(&receipt),
        Err(e) => {
            tracing::warn!(kind = ?e.kind(), "transaction rejected: {}", e);
            Err(anyhow!("transaction rejected ({:?}): {}", e.kind(), e))
        }
    }
}

/// The requested treasury, or the one the registry is bound to.
fn resolve_treasury(
    deployment: &Deployment,
    requested: Option<Address>,
) -> Result<Address, ContractError> {
    match requested.or_else(|| deployment.bound_treasury()) {
        Some(treasury) => Ok(treasury),
        None => Err(ValocracyError::TreasuryNotSet.into()),
    }
}

#[derive(Serialize)]
struct Summary {
    owner: Address,
    registry: Address,
    asset: Address,
    treasury: Option<Address>,
    total_assets: u64,
    total_shares: u64,
    holders: usize,
    valors: usize,
    certificates_outstanding: u64,
    sequence: u64,
}

fn summary(deployment: &Deployment) -> Summary {
    let treasury = deployment.bound_treasury();
    let vault = treasury.and_then(|t| deployment.treasury(t).ok());
    Summary {
        owner: deployment.valocracy().owner(),
        registry: deployment.valocracy().address(),
        asset: deployment.asset().address(),
        treasury,
        total_assets: vault.map_or(0, |t| t.total_assets(deployment.asset())),
        total_shares: vault.map_or(0, |t| t.total_shares()),
        holders: vault.map_or(0, |t| t.holder_count()),
        valors: deployment.valocracy().valors().count(),
        certificates_outstanding: deployment.valocracy().total_supply(),
        sequence: deployment.sequence(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", text);
    Ok(())
}

/// Serves the REST API and the metrics endpoint until a shutdown signal.
async fn serve(store: Store, args: cli::ServeArgs) -> Result<()> {
    let deployment = store.load()?;
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        sequence = deployment.sequence(),
        "starting valocracy-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics registry")?);
    node_metrics.observe(&deployment);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION,
        ),
        deployment: Arc::new(deployment),
        db: Arc::new(store.into_db()),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("valocracy-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("valocracy-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
