//! # CLI Interface
//!
//! Defines the command-line argument structure for `valocracy-node` using
//! `clap` derive. Every mutating subcommand names its caller explicitly;
//! the node holds no keys and trusts the principal it is given.
//!
//! Principals are written either as an address (`val1...` or 64 hex
//! characters) or as `@label`, which resolves to `Address::derive(label)`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use valocracy_protocol::config;
use valocracy_protocol::identity::Address;

/// Valocracy node.
///
/// Hosts a persisted Valocracy deployment (certificate registry, treasury
/// vault and pooled asset), applies transactions to it from the command
/// line, and serves a read-only HTTP API with Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "valocracy-node",
    about = "Valocracy contribution-weighted treasury node",
    version,
    propagate_version = true
)]
pub struct ValocracyNodeCli {
    /// Directory holding the node's database.
    #[arg(
        long,
        short = 'd',
        global = true,
        env = config::ENV_DATA_DIR,
        default_value = config::DEFAULT_DATA_DIR
    )]
    pub data_dir: PathBuf,

    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = config::ENV_LOG_FORMAT, default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Valocracy node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a fresh deployment administered by `owner`.
    Init(InitArgs),
    /// Define or redefine a certificate type (valor).
    Define(DefineArgs),
    /// Issue a certificate, crediting treasury shares to the recipient.
    Issue(IssueArgs),
    /// Burn a certificate. Its treasury shares are kept.
    Burn(BurnArgs),
    /// Mint pooled asset units (asset issuer only).
    MintAsset(MintAssetArgs),
    /// Donate pooled asset units to a treasury.
    Fund(FundArgs),
    /// Redeem treasury shares for pooled asset units.
    Redeem(RedeemArgs),
    /// Bind the registry to a treasury.
    SetTreasury(SetTreasuryArgs),
    /// Print a summary of the deployment.
    Status,
    /// Print committed events.
    Events(EventsArgs),
    /// Serve the read-only HTTP API and metrics endpoint.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Administrator of the registry and issuer of the pooled asset.
    #[arg(long, value_parser = parse_principal)]
    pub owner: Address,
}

#[derive(Args, Debug)]
pub struct DefineArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    /// Valor (certificate type) id.
    #[arg(long)]
    pub id: u64,

    /// Weight credited to the treasury for each issued certificate.
    #[arg(long)]
    pub rarity: u64,

    /// Metadata URI.
    #[arg(long, default_value = "")]
    pub metadata: String,
}

#[derive(Args, Debug)]
pub struct IssueArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    #[arg(long, value_parser = parse_principal)]
    pub to: Address,

    /// Valor id of the certificate to issue.
    #[arg(long)]
    pub valor: u64,
}

#[derive(Args, Debug)]
pub struct BurnArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    #[arg(long)]
    pub token_id: u64,
}

#[derive(Args, Debug)]
pub struct MintAssetArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    #[arg(long, value_parser = parse_principal)]
    pub to: Address,

    #[arg(long)]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct FundArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    #[arg(long)]
    pub amount: u64,

    /// Target treasury. Defaults to the one bound to the registry.
    #[arg(long, value_parser = parse_principal)]
    pub treasury: Option<Address>,
}

#[derive(Args, Debug)]
pub struct RedeemArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    /// Holder whose shares are redeemed. Defaults to the caller.
    #[arg(long, value_parser = parse_principal)]
    pub holder: Option<Address>,

    /// Pooled asset units to withdraw.
    #[arg(long, conflicts_with = "shares", required_unless_present = "shares")]
    pub amount: Option<u64>,

    /// Exact number of shares to burn instead of an asset amount.
    #[arg(long)]
    pub shares: Option<u64>,

    /// Treasury to redeem from. Defaults to the one bound to the registry.
    #[arg(long, value_parser = parse_principal)]
    pub treasury: Option<Address>,
}

#[derive(Args, Debug)]
pub struct SetTreasuryArgs {
    #[arg(long, value_parser = parse_principal)]
    pub caller: Address,

    #[arg(long, value_parser = parse_principal)]
    pub treasury: Address,
}

#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Only print events with a sequence greater than this.
    #[arg(long, default_value_t = 0)]
    pub since: u64,

    /// Maximum number of events to print.
    #[arg(long, default_value_t = config::MAX_EVENTS_PER_QUERY)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port for the read-only REST API.
    #[arg(long, env = config::ENV_API_PORT, default_value_t = config::DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = config::ENV_METRICS_PORT, default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

/// Parses `@label` or an address string into an [`Address`].
pub fn parse_principal(s: &str) -> Result<Address, String> {
    match s.strip_prefix('@') {
        Some("") => Err("empty label after '@'".to_string()),
        Some(label) => Ok(Address::derive(label)),
        None => Address::parse(s).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ValocracyNodeCli::command().debug_assert();
    }

    #[test]
    fn label_principal_resolves_by_derivation() {
        assert_eq!(parse_principal("@alice").unwrap(), Address::derive("alice"));
        assert!(parse_principal("@").is_err());
    }

    #[test]
    fn address_principal_round_trips() {
        let addr = Address::derive("bob");
        assert_eq!(parse_principal(&addr.to_bech32()).unwrap(), addr);
        assert_eq!(parse_principal(&addr.to_hex()).unwrap(), addr);
        assert!(parse_principal("not-an-address").is_err());
    }

    #[test]
    fn redeem_requires_amount_or_shares() {
        let parsed = ValocracyNodeCli::try_parse_from([
            "valocracy-node",
            "redeem",
            "--caller",
            "@alice",
            "--amount",
            "10",
        ])
        .unwrap();
        match parsed.command {
            Commands::Redeem(args) => {
                assert_eq!(args.amount, Some(10));
                assert!(args.holder.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(ValocracyNodeCli::try_parse_from(["valocracy-node", "redeem", "--caller", "@a"]).is_err());
    }
}
