//! Upstream State Access
//!
//! The aggregator never talks to the chain directly. It reads through a
//! [`ChainState`] accessor, which covers the four collaborators it depends on:
//!
//! - **Pool registry**: pool count, pool at index, pool metadata by address
//! - **Voter / gauges**: gauge per pool, liveness, emission rates, token listing
//! - **Reward distributors**: bribe and fee rewards per pool per epoch
//! - **ERC20s**: token metadata and account balances
//!
//! Two implementations ship with the crate:
//!
//! - [`SnapshotState`]: a fixed in-memory snapshot (JSON loadable)
//! - [`RpcState`]: live reads over alloy, batched through Multicall3

mod abi;
mod rpc;
mod snapshot;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SugarError};

pub use abi::{MULTICALL3, WEEK};
pub use rpc::RpcState;
pub use snapshot::{BalanceEntry, SnapshotState};

#[cfg(test)]
pub(crate) use snapshot::fixtures;

// ============================================
// UPSTREAM RECORDS
// ============================================

/// Pool flavour as reported by the registry
///
/// Serialized as the numeric pool type used on-chain:
/// `0` stable, `-1` volatile, `> 0` concentrated with that tick spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum PoolKind {
    Stable,
    Volatile,
    Concentrated { tick_spacing: i32 },
}

impl PoolKind {
    pub fn is_concentrated(&self) -> bool {
        matches!(self, PoolKind::Concentrated { .. })
    }
}

impl From<PoolKind> for i32 {
    fn from(kind: PoolKind) -> i32 {
        match kind {
            PoolKind::Stable => 0,
            PoolKind::Volatile => -1,
            PoolKind::Concentrated { tick_spacing } => tick_spacing,
        }
    }
}

impl TryFrom<i32> for PoolKind {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(PoolKind::Stable),
            -1 => Ok(PoolKind::Volatile),
            spacing if spacing > 0 => Ok(PoolKind::Concentrated {
                tick_spacing: spacing,
            }),
            other => Err(format!("invalid pool type {}", other)),
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Stable => write!(f, "stable"),
            PoolKind::Volatile => write!(f, "volatile"),
            PoolKind::Concentrated { tick_spacing } => write!(f, "CL{}", tick_spacing),
        }
    }
}

/// Gauge attached to a pool by the voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSnapshot {
    pub address: Address,
    pub alive: bool,
    /// Liquidity staked in the gauge
    pub liquidity: U256,
    /// Emissions per second
    pub reward_rate: U256,
    pub reward_token: Address,
    pub fee_reward: Option<Address>,
    pub bribe_reward: Option<Address>,
}

/// Raw pool state as read from the registry, the pool and its gauge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub kind: PoolKind,
    pub factory: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    /// LP supply for basic pools, active liquidity for concentrated pools
    pub liquidity: U256,
    #[serde(default)]
    pub tick: i32,
    #[serde(default)]
    pub sqrt_ratio: U256,
    pub pool_fee: u32,
    #[serde(default)]
    pub unstaked_fee: u32,
    #[serde(default)]
    pub token0_fees: U256,
    #[serde(default)]
    pub token1_fees: U256,
    #[serde(default)]
    pub gauge: Option<GaugeSnapshot>,
}

/// ERC20 metadata; absent when the token does not answer the standard getters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: Address,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
}

impl TokenMetadata {
    /// Usable metadata: non-zero decimals and a non-blank symbol
    pub fn is_valid(&self) -> bool {
        self.decimals > 0 && !self.symbol.trim().is_empty()
    }
}

/// A single reward entry as reported by a distributor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAmount {
    pub token: Address,
    pub amount: U256,
}

/// One pool's voting and reward state for one weekly bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    pub votes: U256,
    /// Gauge emissions per second during the epoch
    pub reward_rate: U256,
    #[serde(default)]
    pub bribes: Vec<RewardAmount>,
    #[serde(default)]
    pub fees: Vec<RewardAmount>,
}

/// Start of the weekly bucket containing `timestamp`
pub fn epoch_start(timestamp: u64) -> u64 {
    timestamp - timestamp % WEEK
}

/// Map the zero-address sentinel to `None`
pub fn non_zero(address: Address) -> Option<Address> {
    if address == Address::ZERO {
        None
    } else {
        Some(address)
    }
}

// ============================================
// ACCESSOR TRAIT
// ============================================

/// Read-only view over upstream chain state
///
/// Implementations must be deterministic for a fixed snapshot: the same
/// index always maps to the same pool address.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Total number of pools known to the registry
    async fn pool_count(&self) -> Result<u64>;

    /// Pool address at global position `index`
    async fn pool_at(&self, index: u64) -> Result<Address>;

    /// Pool addresses for `start..end`, in index order
    async fn pool_range(&self, start: u64, end: u64) -> Result<Vec<Address>> {
        try_join_all((start..end).map(|index| self.pool_at(index))).await
    }

    /// Pool state by address, `None` when the registry does not know it
    async fn pool(&self, address: Address) -> Result<Option<PoolSnapshot>>;

    /// Pool states for `addresses`, in order
    ///
    /// Entries are `None` exactly where [`ChainState::pool`] would return `None`.
    async fn pools(&self, addresses: &[Address]) -> Result<Vec<Option<PoolSnapshot>>> {
        try_join_all(addresses.iter().map(|address| self.pool(*address))).await
    }

    /// Token metadata, `None` when the token does not resolve
    async fn token(&self, address: Address) -> Result<Option<TokenMetadata>>;

    /// Metadata for many tokens; each entry succeeds or fails on its own
    async fn tokens(&self, addresses: &[Address]) -> Vec<Result<Option<TokenMetadata>>> {
        join_all(addresses.iter().map(|address| self.token(*address))).await
    }

    /// Whether the voter lists the token
    async fn is_listed(&self, token: Address) -> Result<bool>;

    /// Listing status for many tokens; each entry succeeds or fails on its own
    async fn listed(&self, tokens: &[Address]) -> Vec<Result<bool>> {
        join_all(tokens.iter().map(|token| self.is_listed(*token))).await
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256>;

    /// Start of the epoch containing the latest block
    async fn current_epoch_start(&self) -> Result<u64>;

    /// Start of the first epoch recorded for the pool, if any
    async fn epoch_history_start(&self, pool: &PoolSnapshot) -> Result<Option<u64>>;

    /// Votes, emissions and rewards for the epoch starting at `epoch_start`
    async fn epoch(&self, pool: &PoolSnapshot, epoch_start: u64) -> Result<EpochSnapshot>;
}

/// Fetch a pool the registry itself handed out; a miss is an upstream fault
pub(crate) async fn registered_pool<S: ChainState + ?Sized>(
    state: &S,
    address: Address,
) -> Result<PoolSnapshot> {
    state
        .pool(address)
        .await?
        .ok_or_else(|| SugarError::upstream(address, "registry pool has no readable state"))
}

/// Batched [`registered_pool`], in input order
pub(crate) async fn registered_pools<S: ChainState + ?Sized>(
    state: &S,
    addresses: &[Address],
) -> Result<Vec<PoolSnapshot>> {
    let pools = state.pools(addresses).await?;
    addresses
        .iter()
        .zip(pools)
        .map(|(address, pool)| {
            pool.ok_or_else(|| {
                SugarError::upstream(*address, "registry pool has no readable state")
            })
        })
        .collect()
}
