//! Sugar Records
//!
//! Fixed-schema records returned by the aggregator. Field order is part of
//! the compatibility contract: reordering, adding or removing a field
//! requires bumping [`SCHEMA_VERSION`].

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SugarError};
use crate::state::{non_zero, EpochSnapshot, PoolKind, PoolSnapshot, RewardAmount, WEEK};

/// Version of the record layouts below
pub const SCHEMA_VERSION: u32 = 3;

// ============================================
// PAGE BOUNDS
// ============================================

/// Maximum pools per call (`all`, `for_swaps`, `epochs_latest`)
pub const MAX_LPS: usize = 500;

/// Maximum tokens per call
pub const MAX_TOKENS: usize = 2_000;

/// Maximum epochs per call
pub const MAX_EPOCHS: usize = 200;

// ============================================
// POOL
// ============================================

/// Full pool record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lp {
    pub lp: Address,
    pub symbol: String,
    pub decimals: u8,
    pub liquidity: U256,

    pub pool_type: PoolKind,
    pub tick: i32,
    pub sqrt_ratio: U256,

    pub token0: Address,
    pub reserve0: U256,
    pub staked0: U256,

    pub token1: Address,
    pub reserve1: U256,
    pub staked1: U256,

    pub gauge: Option<Address>,
    pub gauge_liquidity: U256,
    pub gauge_alive: bool,

    /// Fee reward distributor
    pub fee: Option<Address>,
    /// Bribe reward distributor
    pub bribe: Option<Address>,
    pub factory: Address,

    /// Emissions per second, zero unless the gauge is alive
    pub emissions: U256,
    pub emissions_token: Option<Address>,

    pub pool_fee: u32,
    pub unstaked_fee: u32,
    pub token0_fees: U256,
    pub token1_fees: U256,
}

impl Lp {
    /// Field names in wire order
    pub const FIELDS: [&'static str; 25] = [
        "lp",
        "symbol",
        "decimals",
        "liquidity",
        "pool_type",
        "tick",
        "sqrt_ratio",
        "token0",
        "reserve0",
        "staked0",
        "token1",
        "reserve1",
        "staked1",
        "gauge",
        "gauge_liquidity",
        "gauge_alive",
        "fee",
        "bribe",
        "factory",
        "emissions",
        "emissions_token",
        "pool_fee",
        "unstaked_fee",
        "token0_fees",
        "token1_fees",
    ];

    pub fn project(pool: &PoolSnapshot) -> Result<Self> {
        let gauge = pool.gauge.as_ref();
        let gauge_liquidity = gauge.map(|g| g.liquidity).unwrap_or_default();
        let gauge_alive = gauge.map(|g| g.alive).unwrap_or(false);

        Ok(Self {
            lp: pool.address,
            symbol: pool.symbol.clone(),
            decimals: pool.decimals,
            liquidity: pool.liquidity,
            pool_type: pool.kind,
            tick: pool.tick,
            sqrt_ratio: pool.sqrt_ratio,
            token0: pool.token0,
            reserve0: pool.reserve0,
            staked0: staked_share(pool.reserve0, gauge_liquidity, pool.liquidity)?,
            token1: pool.token1,
            reserve1: pool.reserve1,
            staked1: staked_share(pool.reserve1, gauge_liquidity, pool.liquidity)?,
            gauge: gauge.map(|g| g.address),
            gauge_liquidity,
            gauge_alive,
            fee: gauge.and_then(|g| g.fee_reward),
            bribe: gauge.and_then(|g| g.bribe_reward),
            factory: pool.factory,
            emissions: match gauge {
                Some(g) if g.alive => g.reward_rate,
                _ => U256::ZERO,
            },
            emissions_token: gauge.and_then(|g| non_zero(g.reward_token)),
            pool_fee: pool.pool_fee,
            unstaked_fee: pool.unstaked_fee,
            token0_fees: pool.token0_fees,
            token1_fees: pool.token1_fees,
        })
    }
}

/// Portion of `reserve` backing staked liquidity
fn staked_share(reserve: U256, staked: U256, liquidity: U256) -> Result<U256> {
    if liquidity.is_zero() || staked.is_zero() {
        return Ok(U256::ZERO);
    }
    reserve
        .checked_mul(staked)
        .map(|n| n / liquidity)
        .ok_or(SugarError::ArithmeticOverflow("staked reserves"))
}

// ============================================
// SWAP POOL
// ============================================

/// Reduced pool record for swap routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLp {
    pub lp: Address,
    pub pool_type: PoolKind,
    pub token0: Address,
    pub token1: Address,
    pub factory: Address,
    pub pool_fee: u32,
}

impl SwapLp {
    pub const FIELDS: [&'static str; 6] =
        ["lp", "pool_type", "token0", "token1", "factory", "pool_fee"];

    /// Routable pools hold liquidity and both reserves
    pub fn eligible(pool: &PoolSnapshot) -> bool {
        !pool.liquidity.is_zero() && !pool.reserve0.is_zero() && !pool.reserve1.is_zero()
    }

    pub fn project(pool: &PoolSnapshot) -> Self {
        Self {
            lp: pool.address,
            pool_type: pool.kind,
            token0: pool.token0,
            token1: pool.token1,
            factory: pool.factory,
            pool_fee: pool.pool_fee,
        }
    }
}

// ============================================
// TOKEN
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_address: Address,
    pub symbol: String,
    pub decimals: u8,
    /// Balance of the requested account, zero when none was given
    pub account_balance: U256,
    /// Whitelisted by the voter
    pub listed: bool,
}

impl Token {
    pub const FIELDS: [&'static str; 5] =
        ["token_address", "symbol", "decimals", "account_balance", "listed"];
}

// ============================================
// EPOCHS
// ============================================

/// A reward paid out during an epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpEpochReward {
    pub token: Address,
    pub amount: U256,
}

impl LpEpochReward {
    pub const FIELDS: [&'static str; 2] = ["token", "amount"];
}

/// One pool's weekly voting and reward record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpEpoch {
    /// Epoch start
    pub ts: u64,
    pub lp: Address,
    pub votes: U256,
    /// Total emissions for the epoch
    pub emissions: U256,
    pub bribes: Vec<LpEpochReward>,
    pub fees: Vec<LpEpochReward>,
}

impl LpEpoch {
    pub const FIELDS: [&'static str; 6] = ["ts", "lp", "votes", "emissions", "bribes", "fees"];

    pub fn project(lp: Address, ts: u64, epoch: &EpochSnapshot) -> Result<Self> {
        let emissions = epoch
            .reward_rate
            .checked_mul(U256::from(WEEK))
            .ok_or(SugarError::ArithmeticOverflow("epoch emissions"))?;

        Ok(Self {
            ts,
            lp,
            votes: epoch.votes,
            emissions,
            bribes: merge_rewards(&epoch.bribes)?,
            fees: merge_rewards(&epoch.fees)?,
        })
    }
}

/// Sum rewards per token (first-seen order) and drop empty entries
fn merge_rewards(entries: &[RewardAmount]) -> Result<Vec<LpEpochReward>> {
    let mut merged: Vec<LpEpochReward> = Vec::with_capacity(entries.len());

    for entry in entries {
        match merged.iter_mut().find(|r| r.token == entry.token) {
            Some(existing) => {
                existing.amount = existing
                    .amount
                    .checked_add(entry.amount)
                    .ok_or(SugarError::ArithmeticOverflow("epoch reward total"))?;
            }
            None => merged.push(LpEpochReward {
                token: entry.token,
                amount: entry.amount,
            }),
        }
    }

    merged.retain(|r| !r.amount.is_zero());
    Ok(merged)
}
