//! Sugar Deployment Check
//!
//! Run with: cargo run --bin sugar-check
//!
//! Exercises every read against the configured deployment and reports
//! which expectations hold. Needs a populated registry (at least
//! `MAX_LPS` pools and more than a dozen epochs on pool 0).

use alloy_primitives::U256;
use color_eyre::eyre::{ensure, eyre, Result};
use console::style;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sugar::deployments::{self, BASE_CHAIN_ID};
use sugar::state::{ChainState, RpcState, SnapshotState};
use sugar::sugar::{Lp, MAX_LPS};
use sugar::{Config, Sugar};

#[derive(Default)]
struct Report {
    passed: usize,
    failures: Vec<String>,
}

impl Report {
    fn record(&mut self, name: &str, outcome: Result<String>) {
        match outcome {
            Ok(detail) => {
                self.passed += 1;
                println!("   ✅ {}: {}", style(name).green(), detail);
            }
            Err(e) => {
                println!("   ❌ {}: {}", style(name).red(), e);
                self.failures.push(format!("{}: {}", name, e));
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sugar=warn".parse()?),
        )
        .init();

    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                 SUGAR DEPLOYMENT CHECK                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let config = Config::from_env()?;
    config.validate()?;
    let deployment = config.deployment()?;

    let start = Instant::now();
    let report = match &config.snapshot_path {
        Some(path) => {
            let state = SnapshotState::from_json_file(path)?;
            run_checks(&Sugar::new(state, deployment), config.chain_id).await
        }
        None => {
            let state = RpcState::new(config.rpc_url.clone(), config.chain_id, &deployment);
            run_checks(&Sugar::new(state, deployment), config.chain_id).await
        }
    };

    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    if report.failures.is_empty() {
        println!(
            "║ {:<58} ║",
            format!("✅ ALL {} CHECKS PASSED ({:.1?})", report.passed, start.elapsed())
        );
        println!("╚════════════════════════════════════════════════════════════╝");
        Ok(())
    } else {
        println!("║ {:<58} ║", format!("❌ {} CHECK(S) FAILED", report.failures.len()));
        println!("╚════════════════════════════════════════════════════════════╝");
        for failure in &report.failures {
            println!("   • {}", failure);
        }
        Err(eyre!("{} check(s) failed", report.failures.len()))
    }
}

async fn run_checks<S: ChainState>(sugar: &Sugar<S>, chain_id: u64) -> Report {
    let mut report = Report::default();

    println!("📜 DEPLOYMENT");
    report.record("initial state", check_initial_state(sugar, chain_id));
    println!();

    println!("🏊 POOLS");
    report.record("by_index", check_by_index(sugar).await);
    report.record("for_swaps", check_for_swaps(sugar).await);
    report.record("all", check_all(sugar).await);
    report.record("all pagination", check_all_pagination(sugar).await);
    report.record("all limit/offset", check_all_limit_offset(sugar).await);
    println!();

    println!("🪙 TOKENS");
    report.record("tokens", check_tokens(sugar).await);
    println!();

    println!("🗓️  EPOCHS");
    report.record("epochs_by_address limit/offset", check_epochs_by_address(sugar).await);
    report.record("epochs_latest limit/offset", check_epochs_latest(sugar).await);

    report
}

// ============================================
// CHECKS
// ============================================

fn check_initial_state<S: ChainState>(sugar: &Sugar<S>, chain_id: u64) -> Result<String> {
    if chain_id != BASE_CHAIN_ID {
        return Ok(format!("chain {} has no reference deployment, skipped", chain_id));
    }
    let expected = deployments::known(BASE_CHAIN_ID).ok_or_else(|| eyre!("Base deployment missing"))?;
    let actual = sugar.deployment();

    ensure!(actual.voter == expected.voter, "voter is {:?}", actual.voter);
    ensure!(actual.registry == expected.registry, "registry is {:?}", actual.registry);
    ensure!(actual.convertor == expected.convertor, "convertor is {:?}", actual.convertor);
    ensure!(actual.nfpm == expected.nfpm, "nfpm is {:?}", actual.nfpm);
    ensure!(actual.cl_helper == expected.cl_helper, "cl_helper is {:?}", actual.cl_helper);
    Ok("collaborators match".to_string())
}

async fn check_by_index<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let lp = sugar.by_index(0).await?;

    ensure!(Lp::FIELDS.len() == 25, "Lp has {} fields", Lp::FIELDS.len());
    let gauge = lp.gauge.ok_or_else(|| eyre!("pool 0 has no gauge"))?;
    Ok(format!("{:?} ({}) gauge {:?}", lp.lp, lp.symbol, gauge))
}

async fn check_for_swaps<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let first = sugar.by_index(0).await?;
    let second = sugar.by_index(1).await?;
    let swaps = sugar.for_swaps(10, 0).await?;

    ensure!(swaps.len() > 1, "only {} swap pools", swaps.len());
    ensure!(swaps[0].lp == first.lp, "first swap pool is {:?}", swaps[0].lp);
    ensure!(swaps[1].lp == second.lp, "second swap pool is {:?}", swaps[1].lp);
    Ok(format!("{} pools", swaps.len()))
}

async fn check_tokens<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let first = sugar.by_index(0).await?;
    let tokens = sugar.tokens(10, 0, None, &[]).await?;

    ensure!(tokens.len() > 1, "only {} tokens", tokens.len());
    let (token0, token1) = (&tokens[0], &tokens[1]);
    ensure!(token0.token_address == first.token0, "token0 is {:?}", token0.token_address);
    ensure!(!token0.symbol.is_empty(), "token0 has no symbol");
    ensure!(token0.decimals > 0, "token0 has 0 decimals");
    ensure!(token1.token_address == first.token1, "token1 is {:?}", token1.token_address);
    Ok(format!("{} / {}", token0.symbol, token1.symbol))
}

async fn check_all<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let first = sugar.by_index(0).await?;
    let second = sugar.by_index(1).await?;
    let lps = sugar.all(10, 0).await?;

    ensure!(lps.len() > 1, "only {} pools", lps.len());
    ensure!(lps[0].lp == first.lp && lps[0].gauge == first.gauge, "pool 0 differs from by_index(0)");
    ensure!(lps[1].lp == second.lp && lps[1].gauge == second.gauge, "pool 1 differs from by_index(1)");
    Ok(format!("{} pools", lps.len()))
}

async fn check_all_pagination<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let max_lps = sugar.max_lps();
    let started = Instant::now();
    let lps = sugar.all(max_lps, 0).await?;

    ensure!(lps.len() > MAX_LPS - 1, "full page returned {} pools", lps.len());
    Ok(format!("{} pools in {:?}", lps.len(), started.elapsed()))
}

async fn check_all_limit_offset<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let second = sugar.by_index(1).await?;
    let lps = sugar.all(1, 1).await?;

    ensure!(lps.len() == 1, "got {} pools", lps.len());
    ensure!(lps[0].lp == second.lp, "got {:?}", lps[0].lp);
    Ok(format!("{:?}", lps[0].lp))
}

async fn check_epochs_by_address<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let first = sugar.by_index(0).await?;
    let epochs = sugar.epochs_by_address(20, 3, first.lp).await?;

    ensure!(epochs.len() > 10, "only {} epochs", epochs.len());
    let epoch = &epochs[1];
    ensure!(epoch.lp == first.lp, "epoch belongs to {:?}", epoch.lp);
    ensure!(epoch.votes > U256::ZERO, "epoch has no votes");
    ensure!(epoch.emissions > U256::ZERO, "epoch has no emissions");
    if let Some(bribe) = epoch.bribes.first() {
        ensure!(bribe.amount > U256::ZERO, "zero bribe for {:?}", bribe.token);
    }
    if let Some(fee) = epoch.fees.first() {
        ensure!(fee.amount > U256::ZERO, "zero fee for {:?}", fee.token);
    }
    Ok(format!("{} epochs", epochs.len()))
}

async fn check_epochs_latest<S: ChainState>(sugar: &Sugar<S>) -> Result<String> {
    let second = sugar.by_index(1).await?;
    let by_address = sugar.epochs_by_address(1, 0, second.lp).await?;
    let latest = sugar.epochs_latest(1, 1).await?;

    ensure!(latest.len() == 1, "got {} latest epochs", latest.len());
    let expected = by_address
        .first()
        .ok_or_else(|| eyre!("pool 1 has no epochs"))?;
    ensure!(latest[0].lp == expected.lp, "latest epoch belongs to {:?}", latest[0].lp);
    ensure!(latest[0].ts == expected.ts, "latest epoch is {}", latest[0].ts);
    Ok(format!("epoch {}", latest[0].ts))
}
