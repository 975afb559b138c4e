//! Sugar CLI
//!
//! Run with: cargo run -- <command>
//!
//! Every command prints JSON on stdout; logs go to stderr.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sugar::state::{non_zero, ChainState, RpcState, SnapshotState};
use sugar::sugar::{LpEpoch, MAX_LPS, SCHEMA_VERSION};
use sugar::{Config, Sugar};

#[derive(Parser)]
#[command(name = "sugar", version, about = "Read-only LP data for ve(3,3) DEX deployments")]
struct Cli {
    /// Load settings from a TOML file instead of the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve from a JSON snapshot instead of live RPC
    #[arg(long, global = true)]
    snapshot: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show configuration, deployment and registry size
    Info,
    /// Pool at a global index
    ByIndex { index: u64 },
    /// Pool by address
    ByAddress { address: Address },
    /// Page of pools by global index
    All {
        #[arg(long, default_value_t = MAX_LPS)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Walk every page until the registry is exhausted
        #[arg(long)]
        every: bool,
    },
    /// Page of swap-eligible pools
    ForSwaps {
        #[arg(long, default_value_t = MAX_LPS)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Tokens referenced by pools
    Tokens {
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Include this account's balance of each token
        #[arg(long)]
        account: Option<Address>,
        /// Restrict to these tokens (comma separated)
        #[arg(long, value_delimiter = ',')]
        addresses: Vec<Address>,
    },
    /// Epoch history of one pool, newest first
    Epochs {
        address: Address,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Print a table instead of JSON
        #[arg(long)]
        human: bool,
    },
    /// Latest epoch for a page of pools
    Latest {
        #[arg(long, default_value_t = MAX_LPS)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        human: bool,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🍬 SUGAR - LP Data Aggregator").cyan().bold());
    println!(
        "{}",
        style(format!("    Schema v{} | Read-only | Paginated", SCHEMA_VERSION)).cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--account 0x0` asks for no balances, same as leaving it out
fn balance_account(account: Option<Address>) -> Option<Address> {
    account.and_then(non_zero)
}

fn format_epoch(ts: u64) -> String {
    i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|date| date.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn print_epochs(epochs: &[LpEpoch]) {
    println!(
        "{:<22} {:<44} {:>24} {:>28} {:>6} {:>6}",
        "EPOCH", "POOL", "VOTES", "EMISSIONS", "BRIBES", "FEES"
    );
    for epoch in epochs {
        println!(
            "{:<22} {:<44} {:>24} {:>28} {:>6} {:>6}",
            format_epoch(epoch.ts),
            format!("{:?}", epoch.lp),
            epoch.votes,
            epoch.emissions,
            epoch.bribes.len(),
            epoch.fees.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sugar=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot_path = Some(snapshot.clone());
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    let deployment = config.deployment()?;

    match &config.snapshot_path {
        Some(path) => {
            let state = SnapshotState::from_json_file(path)?;
            let sugar = Sugar::new(state, deployment).with_token_policy(config.token_policy);
            run(&sugar, &config, cli.command).await
        }
        None => {
            let state = RpcState::new(config.rpc_url.clone(), config.chain_id, &deployment);
            let sugar = Sugar::new(state, deployment).with_token_policy(config.token_policy);
            run(&sugar, &config, cli.command).await
        }
    }
}

async fn run<S: ChainState>(sugar: &Sugar<S>, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            print_banner();
            config.print_summary();
            println!();

            let pools = sugar.state().pool_count().await?;
            let epoch = sugar.state().current_epoch_start().await?;
            println!("{} {}", style("Pools:").bold(), pools);
            println!("{} {}", style("Current epoch:").bold(), format_epoch(epoch));
            println!("{} {}", style("Max page:").bold(), sugar.max_lps());
        }
        Command::ByIndex { index } => emit(&sugar.by_index(index).await?)?,
        Command::ByAddress { address } => emit(&sugar.by_address(address).await?)?,
        Command::All { limit, offset, every } => {
            if every {
                emit(&all_pages(sugar, limit, offset).await?)?;
            } else {
                emit(&sugar.all(limit, offset).await?)?;
            }
        }
        Command::ForSwaps { limit, offset } => emit(&sugar.for_swaps(limit, offset).await?)?,
        Command::Tokens {
            limit,
            offset,
            account,
            addresses,
        } => emit(
            &sugar
                .tokens(limit, offset, balance_account(account), &addresses)
                .await?,
        )?,
        Command::Epochs {
            address,
            limit,
            offset,
            human,
        } => {
            let epochs = sugar.epochs_by_address(limit, offset, address).await?;
            if human {
                print_epochs(&epochs);
            } else {
                emit(&epochs)?;
            }
        }
        Command::Latest {
            limit,
            offset,
            human,
        } => {
            let epochs = sugar.epochs_latest(limit, offset).await?;
            if human {
                print_epochs(&epochs);
            } else {
                emit(&epochs)?;
            }
        }
    }

    Ok(())
}

/// Page through `all` until a short page comes back
async fn all_pages<S: ChainState>(
    sugar: &Sugar<S>,
    limit: usize,
    offset: usize,
) -> Result<Vec<sugar::Lp>> {
    let start = Instant::now();
    let total = sugar.state().pool_count().await?;

    let progress = ProgressBar::new(total.saturating_sub(offset as u64));
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40.cyan/blue}] {pos}/{len} pools ({eta})")?
            .progress_chars("#>-"),
    );

    let page_size = limit.clamp(1, MAX_LPS);
    let mut lps = Vec::new();
    let mut cursor = offset;
    loop {
        let page = sugar.all(page_size, cursor).await?;
        progress.inc(page.len() as u64);
        cursor += page.len();

        let done = page.len() < page_size;
        lps.extend(page);
        if done {
            break;
        }
    }
    progress.finish_and_clear();

    info!("Fetched {} pools in {:?}", lps.len(), start.elapsed());
    Ok(lps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_account_means_no_balances() {
        assert_eq!(balance_account(None), None);
        assert_eq!(balance_account(Some(Address::ZERO)), None);

        let account = Address::repeat_byte(0xaa);
        assert_eq!(balance_account(Some(account)), Some(account));
    }

    #[test]
    fn test_cli_parses_zero_account() {
        let cli = Cli::try_parse_from(["sugar", "tokens", "--account", &format!("{:?}", Address::ZERO)]).unwrap();
        let Command::Tokens { account, .. } = cli.command else {
            panic!("expected tokens command");
        };
        assert_eq!(balance_account(account), None);
    }

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(0), "1970-01-01 00:00 UTC");
        assert_eq!(format_epoch(u64::MAX), u64::MAX.to_string());
    }
}
