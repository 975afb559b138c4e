//! Live Chain State - MULTICALL3 Edition
//!
//! Reads registry, pool, gauge and reward distributor state over HTTP.
//! Every lookup is batched through Multicall3 `aggregate3` with
//! `allowFailure`, so a window of pools costs two round trips and an epoch
//! three, regardless of how many getters are involved.
//!
//! Only the reads that tell concentrated pools from basic ones (and
//! plain ERC20 metadata) may fail quietly. Any other failed getter fails the
//! read it belongs to.

use alloy_primitives::{Address, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::eyre;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::abi::*;
use super::{
    epoch_start, non_zero, ChainState, EpochSnapshot, GaugeSnapshot, PoolKind, PoolSnapshot,
    RewardAmount, TokenMetadata,
};
use crate::deployments::Deployment;
use crate::error::{Result, SugarError};

/// Upper bound on reward tokens read per distributor
const MAX_REWARDS: u64 = 64;

lazy_static::lazy_static! {
    /// Token metadata never changes once deployed: (chain id, token) -> metadata
    static ref TOKEN_CACHE: RwLock<HashMap<(u64, Address), TokenMetadata>> = RwLock::new(HashMap::new());
}

// ============================================
// BATCH HELPERS
// ============================================

/// Ordered set of calls for one aggregate3 round trip
#[derive(Default)]
struct Batch {
    calls: Vec<IMulticall3::Call3>,
}

impl Batch {
    /// Queue a call and return its slot in the results
    fn push<C: SolCall>(&mut self, target: Address, call: C) -> usize {
        self.calls.push(IMulticall3::Call3 {
            target,
            allowFailure: true,
            callData: call.abi_encode().into(),
        });
        self.calls.len() - 1
    }
}

/// Decode a successful result, `None` on revert or bad data
fn decode<C: SolCall>(results: &[IMulticall3::Result], slot: usize) -> Option<C::Return> {
    let result = results.get(slot)?;
    if !result.success {
        return None;
    }
    C::abi_decode_returns(&result.returnData).ok()
}

/// Decode a result the caller cannot do without
fn required<C: SolCall>(
    results: &[IMulticall3::Result],
    slot: usize,
    target: Address,
) -> Result<C::Return> {
    decode::<C>(results, slot)
        .ok_or_else(|| SugarError::upstream(target, format!("{} reverted", C::SIGNATURE)))
}

/// Find the factory owning global pool `index`
///
/// `lengths` holds each factory with its pool count, in registry order.
/// Returns the factory and the index local to it.
fn locate(lengths: &[(Address, u64)], index: u64) -> Option<(Address, u64)> {
    let mut base = 0u64;
    for (factory, length) in lengths {
        if index < base + length {
            return Some((*factory, index - base));
        }
        base += length;
    }
    None
}

// ============================================
// POOL READS
// ============================================

/// Everything learned about a pool from the first round trip
struct PoolBase {
    symbol: String,
    decimals: u8,
    kind: PoolKind,
    factory: Address,
    token0: Address,
    token1: Address,
    reserves: (U256, U256),
    liquidity: U256,
    staked_liquidity: U256,
    tick: i32,
    sqrt_ratio: U256,
    pool_fee: u32,
    unstaked_fee: u32,
    pool_fees: Option<Address>,
    token_fees: (U256, U256),
    gauge: Option<Address>,
}

/// First round trip: every getter of both pool flavours
struct BaseSlots {
    token0: usize,
    token1: usize,
    symbol: usize,
    decimals: usize,
    factory: usize,
    stable: usize,
    reserves: usize,
    supply: usize,
    pool_fees: usize,
    tick_spacing: usize,
    slot0: usize,
    liquidity: usize,
    staked: usize,
    fee: usize,
    unstaked_fee: usize,
    gauge_fees: usize,
    gauge: usize,
}

impl BaseSlots {
    fn push(batch: &mut Batch, address: Address, voter: Address) -> Self {
        Self {
            token0: batch.push(address, IPool::token0Call {}),
            token1: batch.push(address, IPool::token1Call {}),
            symbol: batch.push(address, IPool::symbolCall {}),
            decimals: batch.push(address, IPool::decimalsCall {}),
            factory: batch.push(address, IPool::factoryCall {}),
            stable: batch.push(address, IPool::stableCall {}),
            reserves: batch.push(address, IPool::getReservesCall {}),
            supply: batch.push(address, IPool::totalSupplyCall {}),
            pool_fees: batch.push(address, IPool::poolFeesCall {}),
            tick_spacing: batch.push(address, ICLPool::tickSpacingCall {}),
            slot0: batch.push(address, ICLPool::slot0Call {}),
            liquidity: batch.push(address, ICLPool::liquidityCall {}),
            staked: batch.push(address, ICLPool::stakedLiquidityCall {}),
            fee: batch.push(address, ICLPool::feeCall {}),
            unstaked_fee: batch.push(address, ICLPool::unstakedFeeCall {}),
            gauge_fees: batch.push(address, ICLPool::gaugeFeesCall {}),
            gauge: batch.push(voter, IVoter::gaugesCall { pool: address }),
        }
    }

    /// `None` when the address does not answer token0/token1
    fn parse(
        &self,
        results: &[IMulticall3::Result],
        address: Address,
        voter: Address,
    ) -> Result<Option<PoolBase>> {
        let (Some(token0), Some(token1)) = (
            decode::<IPool::token0Call>(results, self.token0),
            decode::<IPool::token1Call>(results, self.token1),
        ) else {
            debug!("{:?} does not answer token0/token1, not a pool", address);
            return Ok(None);
        };

        let gauge = non_zero(required::<IVoter::gaugesCall>(results, self.gauge, voter)?);
        let factory = required::<IPool::factoryCall>(results, self.factory, address)?;

        // tickSpacing only exists on concentrated pools
        let base = match decode::<ICLPool::tickSpacingCall>(results, self.tick_spacing) {
            Some(spacing) => {
                let slot0 = required::<ICLPool::slot0Call>(results, self.slot0, address)?;
                let gauge_fees =
                    required::<ICLPool::gaugeFeesCall>(results, self.gauge_fees, address)?;
                PoolBase {
                    symbol: String::new(),
                    decimals: 18,
                    kind: PoolKind::Concentrated {
                        tick_spacing: spacing.as_i32(),
                    },
                    factory,
                    token0,
                    token1,
                    reserves: (U256::ZERO, U256::ZERO),
                    liquidity: U256::from(required::<ICLPool::liquidityCall>(
                        results,
                        self.liquidity,
                        address,
                    )?),
                    staked_liquidity: U256::from(required::<ICLPool::stakedLiquidityCall>(
                        results,
                        self.staked,
                        address,
                    )?),
                    tick: slot0.tick.as_i32(),
                    sqrt_ratio: U256::from(slot0.sqrtPriceX96),
                    pool_fee: required::<ICLPool::feeCall>(results, self.fee, address)?.to::<u32>(),
                    unstaked_fee: required::<ICLPool::unstakedFeeCall>(
                        results,
                        self.unstaked_fee,
                        address,
                    )?
                    .to::<u32>(),
                    pool_fees: None,
                    token_fees: (U256::from(gauge_fees.token0), U256::from(gauge_fees.token1)),
                    gauge,
                }
            }
            None => {
                let reserves = required::<IPool::getReservesCall>(results, self.reserves, address)?;
                let stable = required::<IPool::stableCall>(results, self.stable, address)?;
                PoolBase {
                    symbol: required::<IPool::symbolCall>(results, self.symbol, address)?,
                    decimals: required::<IPool::decimalsCall>(results, self.decimals, address)?,
                    kind: if stable {
                        PoolKind::Stable
                    } else {
                        PoolKind::Volatile
                    },
                    factory,
                    token0,
                    token1,
                    reserves: (reserves._reserve0, reserves._reserve1),
                    liquidity: required::<IPool::totalSupplyCall>(results, self.supply, address)?,
                    staked_liquidity: U256::ZERO,
                    tick: 0,
                    sqrt_ratio: U256::ZERO,
                    pool_fee: 0,
                    unstaked_fee: 0,
                    pool_fees: non_zero(required::<IPool::poolFeesCall>(
                        results,
                        self.pool_fees,
                        address,
                    )?),
                    token_fees: (U256::ZERO, U256::ZERO),
                    gauge,
                }
            }
        };
        Ok(Some(base))
    }
}

struct GaugeSlots {
    alive: usize,
    rate: usize,
    token: usize,
    /// Basic pools only; concentrated gauges report staked liquidity on the pool
    supply: Option<usize>,
    fees: usize,
    bribe: usize,
}

/// Second round trip: reserves, fees and gauge details
struct DetailSlots {
    reserves: Option<(usize, usize)>,
    fee: Option<usize>,
    token_fees: Option<(usize, usize)>,
    symbols: Option<(usize, usize)>,
    gauge: Option<GaugeSlots>,
}

impl DetailSlots {
    fn push(batch: &mut Batch, address: Address, base: &PoolBase, voter: Address) -> Self {
        let concentrated = base.kind.is_concentrated();

        let (reserves, fee, token_fees, symbols) = if concentrated {
            let reserves = (
                batch.push(base.token0, IERC20::balanceOfCall { account: address }),
                batch.push(base.token1, IERC20::balanceOfCall { account: address }),
            );
            let symbols = (
                batch.push(base.token0, IERC20::symbolCall {}),
                batch.push(base.token1, IERC20::symbolCall {}),
            );
            (Some(reserves), None, None, Some(symbols))
        } else {
            let fee = batch.push(
                base.factory,
                IPoolFactory::getFeeCall {
                    pool: address,
                    stable: base.kind == PoolKind::Stable,
                },
            );
            let token_fees = base.pool_fees.map(|holder| {
                (
                    batch.push(base.token0, IERC20::balanceOfCall { account: holder }),
                    batch.push(base.token1, IERC20::balanceOfCall { account: holder }),
                )
            });
            (None, Some(fee), token_fees, None)
        };

        let gauge = base.gauge.map(|gauge| GaugeSlots {
            alive: batch.push(voter, IVoter::isAliveCall { gauge }),
            rate: batch.push(gauge, IGauge::rewardRateCall {}),
            token: batch.push(gauge, IGauge::rewardTokenCall {}),
            supply: (!concentrated).then(|| batch.push(gauge, IGauge::totalSupplyCall {})),
            fees: batch.push(voter, IVoter::gaugeToFeesCall { gauge }),
            bribe: batch.push(voter, IVoter::gaugeToBribeCall { gauge }),
        });

        Self {
            reserves,
            fee,
            token_fees,
            symbols,
            gauge,
        }
    }

    fn finish(
        self,
        results: &[IMulticall3::Result],
        address: Address,
        base: PoolBase,
        voter: Address,
    ) -> Result<PoolSnapshot> {
        let (reserve0, reserve1) = match self.reserves {
            Some((r0, r1)) => (
                required::<IERC20::balanceOfCall>(results, r0, base.token0)?,
                required::<IERC20::balanceOfCall>(results, r1, base.token1)?,
            ),
            None => base.reserves,
        };

        let pool_fee = match self.fee {
            Some(slot) => required::<IPoolFactory::getFeeCall>(results, slot, base.factory)?
                .saturating_to::<u32>(),
            None => base.pool_fee,
        };

        let (token0_fees, token1_fees) = match self.token_fees {
            Some((f0, f1)) => (
                required::<IERC20::balanceOfCall>(results, f0, base.token0)?,
                required::<IERC20::balanceOfCall>(results, f1, base.token1)?,
            ),
            None => base.token_fees,
        };

        let symbol = match self.symbols {
            Some((s0, s1)) => format!(
                "{}-{}/{}",
                base.kind,
                required::<IERC20::symbolCall>(results, s0, base.token0)?,
                required::<IERC20::symbolCall>(results, s1, base.token1)?,
            ),
            None => base.symbol,
        };

        let gauge = match (base.gauge, self.gauge) {
            (Some(gauge), Some(slots)) => {
                let liquidity = match slots.supply {
                    Some(slot) => required::<IGauge::totalSupplyCall>(results, slot, gauge)?,
                    None => base.staked_liquidity,
                };
                Some(GaugeSnapshot {
                    address: gauge,
                    alive: required::<IVoter::isAliveCall>(results, slots.alive, voter)?,
                    liquidity,
                    reward_rate: required::<IGauge::rewardRateCall>(results, slots.rate, gauge)?,
                    reward_token: required::<IGauge::rewardTokenCall>(results, slots.token, gauge)?,
                    fee_reward: non_zero(required::<IVoter::gaugeToFeesCall>(
                        results, slots.fees, voter,
                    )?),
                    bribe_reward: non_zero(required::<IVoter::gaugeToBribeCall>(
                        results,
                        slots.bribe,
                        voter,
                    )?),
                })
            }
            _ => None,
        };

        Ok(PoolSnapshot {
            address,
            symbol,
            decimals: base.decimals,
            kind: base.kind,
            factory: base.factory,
            token0: base.token0,
            token1: base.token1,
            reserve0,
            reserve1,
            liquidity: base.liquidity,
            tick: base.tick,
            sqrt_ratio: base.sqrt_ratio,
            pool_fee,
            unstaked_fee: base.unstaked_fee,
            token0_fees,
            token1_fees,
            gauge,
        })
    }
}

// ============================================
// REWARD READS
// ============================================

/// Reward list length, capped at [`MAX_REWARDS`]
fn reward_count(results: &[IMulticall3::Result], slot: usize, distributor: Address) -> Result<u64> {
    let length = required::<IReward::rewardsListLengthCall>(results, slot, distributor)?
        .saturating_to::<u64>();
    if length > MAX_REWARDS {
        warn!(
            "Distributor {:?} lists {} reward tokens, reading the first {}",
            distributor, length, MAX_REWARDS
        );
    }
    Ok(length.min(MAX_REWARDS))
}

fn reward_tokens(
    results: &[IMulticall3::Result],
    first_slot: usize,
    count: u64,
    distributor: Address,
) -> Result<Vec<Address>> {
    (0..count as usize)
        .map(|i| required::<IReward::rewardsCall>(results, first_slot + i, distributor))
        .collect()
}

fn reward_amounts(
    results: &[IMulticall3::Result],
    first_slot: usize,
    tokens: Vec<Address>,
    distributor: Address,
) -> Result<Vec<RewardAmount>> {
    tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| {
            Ok(RewardAmount {
                token,
                amount: required::<IReward::tokenRewardsPerEpochCall>(
                    results,
                    first_slot + i,
                    distributor,
                )?,
            })
        })
        .collect()
}

/// Votes for an epoch; a checkpoint written after the epoch closed means none were cast in it
fn checkpoint_votes(
    results: &[IMulticall3::Result],
    slot: usize,
    bribe: Address,
    epoch_end: U256,
) -> Result<U256> {
    let checkpoint = required::<IReward::supplyCheckpointsCall>(results, slot, bribe)?;
    Ok(if checkpoint.timestamp <= epoch_end {
        checkpoint.supply
    } else {
        U256::ZERO
    })
}

// ============================================
// RPC STATE
// ============================================

/// [`ChainState`] backed by a JSON-RPC endpoint
pub struct RpcState {
    rpc_url: String,
    chain_id: u64,
    registry: Address,
    voter: Address,
}

impl RpcState {
    pub fn new(rpc_url: String, chain_id: u64, deployment: &Deployment) -> Self {
        Self {
            rpc_url,
            chain_id,
            registry: deployment.registry,
            voter: deployment.voter,
        }
    }

    /// Execute Multicall3 batches - one eth_call per MAX_CALLS_PER_BATCH calls
    async fn execute_multicall(
        &self,
        calls: Vec<IMulticall3::Call3>,
    ) -> eyre::Result<Vec<IMulticall3::Result>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        let mut results = Vec::with_capacity(calls.len());

        for chunk in calls.chunks(MAX_CALLS_PER_BATCH) {
            let calldata = IMulticall3::aggregate3Call {
                calls: chunk.to_vec(),
            }
            .abi_encode();

            let tx = TransactionRequest::default()
                .to(MULTICALL3)
                .input(calldata.into());

            let raw = provider
                .call(tx)
                .await
                .map_err(|e| eyre!("Multicall3 failed: {}", e))?;

            let decoded = IMulticall3::aggregate3Call::abi_decode_returns(&raw)
                .map_err(|e| eyre!("Failed to decode multicall: {}", e))?;

            results.extend(decoded);
        }

        trace!("Multicall3: {} calls", results.len());
        Ok(results)
    }

    async fn run(&self, batch: Batch) -> Result<Vec<IMulticall3::Result>> {
        self.execute_multicall(batch.calls)
            .await
            .map_err(|e| SugarError::UpstreamUnavailable(e.to_string()))
    }

    /// Registry factories paired with their pool counts
    async fn factory_lengths(&self) -> Result<Vec<(Address, u64)>> {
        let mut batch = Batch::default();
        let slot = batch.push(self.registry, IFactoryRegistry::poolFactoriesCall {});
        let results = self.run(batch).await?;
        let factories =
            required::<IFactoryRegistry::poolFactoriesCall>(&results, slot, self.registry)?;

        let mut batch = Batch::default();
        let slots: Vec<usize> = factories
            .iter()
            .map(|factory| batch.push(*factory, IPoolFactory::allPoolsLengthCall {}))
            .collect();
        let results = self.run(batch).await?;

        factories
            .iter()
            .zip(slots)
            .map(|(factory, slot)| {
                let length = required::<IPoolFactory::allPoolsLengthCall>(&results, slot, *factory)?;
                Ok((*factory, length.saturating_to::<u64>()))
            })
            .collect()
    }
}

#[async_trait]
impl ChainState for RpcState {
    async fn pool_count(&self) -> Result<u64> {
        let lengths = self.factory_lengths().await?;
        Ok(lengths.iter().map(|(_, length)| length).sum())
    }

    async fn pool_at(&self, index: u64) -> Result<Address> {
        let pools = self.pool_range(index, index + 1).await?;
        pools
            .into_iter()
            .next()
            .ok_or_else(|| SugarError::upstream(self.registry, "empty pool range"))
    }

    async fn pool_range(&self, start: u64, end: u64) -> Result<Vec<Address>> {
        let lengths = self.factory_lengths().await?;
        let size: u64 = lengths.iter().map(|(_, length)| length).sum();
        if end > size {
            return Err(SugarError::OutOfRange { index: end - 1, size });
        }

        let mut batch = Batch::default();
        let mut targets = Vec::new();
        for index in start..end {
            let (factory, local) = locate(&lengths, index).ok_or(SugarError::OutOfRange { index, size })?;
            let slot = batch.push(factory, IPoolFactory::allPoolsCall { index: U256::from(local) });
            targets.push((factory, slot));
        }

        let results = self.run(batch).await?;
        targets
            .into_iter()
            .map(|(factory, slot)| required::<IPoolFactory::allPoolsCall>(&results, slot, factory))
            .collect()
    }

    async fn pool(&self, address: Address) -> Result<Option<PoolSnapshot>> {
        Ok(self.pools(&[address]).await?.into_iter().next().flatten())
    }

    async fn pools(&self, addresses: &[Address]) -> Result<Vec<Option<PoolSnapshot>>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = Batch::default();
        let base_slots: Vec<BaseSlots> = addresses
            .iter()
            .map(|address| BaseSlots::push(&mut batch, *address, self.voter))
            .collect();
        let results = self.run(batch).await?;

        let bases = addresses
            .iter()
            .zip(&base_slots)
            .map(|(address, slots)| slots.parse(&results, *address, self.voter))
            .collect::<Result<Vec<_>>>()?;

        let mut batch = Batch::default();
        let details: Vec<Option<DetailSlots>> = addresses
            .iter()
            .zip(&bases)
            .map(|(address, base)| {
                base.as_ref()
                    .map(|base| DetailSlots::push(&mut batch, *address, base, self.voter))
            })
            .collect();
        let results = self.run(batch).await?;

        debug!("Read {} pools in two round trips", addresses.len());
        addresses
            .iter()
            .zip(bases)
            .zip(details)
            .map(|((address, base), slots)| match (base, slots) {
                (Some(base), Some(slots)) => {
                    slots.finish(&results, *address, base, self.voter).map(Some)
                }
                _ => Ok(None),
            })
            .collect()
    }

    async fn token(&self, address: Address) -> Result<Option<TokenMetadata>> {
        self.tokens(&[address])
            .await
            .into_iter()
            .next()
            .unwrap_or(Ok(None))
    }

    async fn tokens(&self, addresses: &[Address]) -> Vec<Result<Option<TokenMetadata>>> {
        let mut resolved: Vec<Option<Result<Option<TokenMetadata>>>> = {
            let cache = TOKEN_CACHE.read().await;
            addresses
                .iter()
                .map(|address| cache.get(&(self.chain_id, *address)).cloned().map(|m| Ok(Some(m))))
                .collect()
        };

        let mut batch = Batch::default();
        let pending: Vec<(usize, usize, usize, usize)> = addresses
            .iter()
            .enumerate()
            .filter(|(i, _)| resolved[*i].is_none())
            .map(|(i, address)| {
                (
                    i,
                    batch.push(*address, IERC20::symbolCall {}),
                    batch.push(*address, IERC20::nameCall {}),
                    batch.push(*address, IERC20::decimalsCall {}),
                )
            })
            .collect();

        if !pending.is_empty() {
            match self.run(batch).await {
                Ok(results) => {
                    let mut cache = TOKEN_CACHE.write().await;
                    for (i, symbol, name, decimals) in pending {
                        let address = addresses[i];
                        // Tokens without standard metadata are reported as unresolved
                        let metadata = match (
                            decode::<IERC20::symbolCall>(&results, symbol),
                            decode::<IERC20::decimalsCall>(&results, decimals),
                        ) {
                            (Some(symbol), Some(decimals)) => {
                                let metadata = TokenMetadata {
                                    address,
                                    symbol,
                                    name: decode::<IERC20::nameCall>(&results, name)
                                        .unwrap_or_default(),
                                    decimals,
                                };
                                cache.insert((self.chain_id, address), metadata.clone());
                                Some(metadata)
                            }
                            _ => None,
                        };
                        resolved[i] = Some(Ok(metadata));
                    }
                }
                Err(e) => {
                    for (i, ..) in pending {
                        resolved[i] = Some(Err(e.clone()));
                    }
                }
            }
        }

        resolved
            .into_iter()
            .map(|entry| entry.unwrap_or(Ok(None)))
            .collect()
    }

    async fn is_listed(&self, token: Address) -> Result<bool> {
        self.listed(&[token]).await.into_iter().next().unwrap_or(Ok(false))
    }

    async fn listed(&self, tokens: &[Address]) -> Vec<Result<bool>> {
        let mut batch = Batch::default();
        let slots: Vec<usize> = tokens
            .iter()
            .map(|token| batch.push(self.voter, IVoter::isWhitelistedTokenCall { token: *token }))
            .collect();

        match self.run(batch).await {
            Ok(results) => slots
                .into_iter()
                .map(|slot| required::<IVoter::isWhitelistedTokenCall>(&results, slot, self.voter))
                .collect(),
            Err(e) => tokens.iter().map(|_| Err(e.clone())).collect(),
        }
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256> {
        let mut batch = Batch::default();
        let slot = batch.push(token, IERC20::balanceOfCall { account });
        let results = self.run(batch).await?;
        required::<IERC20::balanceOfCall>(&results, slot, token)
    }

    async fn current_epoch_start(&self) -> Result<u64> {
        let mut batch = Batch::default();
        let slot = batch.push(MULTICALL3, IMulticall3::getCurrentBlockTimestampCall {});
        let results = self.run(batch).await?;
        let now = required::<IMulticall3::getCurrentBlockTimestampCall>(&results, slot, MULTICALL3)?;
        Ok(epoch_start(now.saturating_to::<u64>()))
    }

    async fn epoch_history_start(&self, pool: &PoolSnapshot) -> Result<Option<u64>> {
        let Some(bribe) = pool.gauge.as_ref().and_then(|g| g.bribe_reward) else {
            return Ok(None);
        };

        let mut batch = Batch::default();
        let count = batch.push(bribe, IReward::supplyNumCheckpointsCall {});
        let first = batch.push(bribe, IReward::supplyCheckpointsCall { index: U256::ZERO });
        let results = self.run(batch).await?;

        let count = required::<IReward::supplyNumCheckpointsCall>(&results, count, bribe)?;
        if count.is_zero() {
            return Ok(None);
        }
        let first = required::<IReward::supplyCheckpointsCall>(&results, first, bribe)?;
        Ok(Some(epoch_start(first.timestamp.saturating_to::<u64>())))
    }

    async fn epoch(&self, pool: &PoolSnapshot, ts: u64) -> Result<EpochSnapshot> {
        let Some(gauge) = pool.gauge.as_ref() else {
            return Ok(EpochSnapshot::default());
        };
        let epoch_end = U256::from(ts + WEEK - 1);

        // Round 1: emission rate, checkpoint index, reward list lengths
        let mut batch = Batch::default();
        let rate = batch.push(
            gauge.address,
            IGauge::rewardRateByEpochCall {
                epochStart: U256::from(ts),
            },
        );
        let prior = gauge
            .bribe_reward
            .map(|bribe| (bribe, batch.push(bribe, IReward::getPriorSupplyIndexCall { timestamp: epoch_end })));
        let bribe_len = gauge
            .bribe_reward
            .map(|bribe| (bribe, batch.push(bribe, IReward::rewardsListLengthCall {})));
        let fee_len = gauge
            .fee_reward
            .map(|fees| (fees, batch.push(fees, IReward::rewardsListLengthCall {})));
        let results = self.run(batch).await?;

        let reward_rate =
            required::<IGauge::rewardRateByEpochCall>(&results, rate, gauge.address)?;
        let bribe_count = match bribe_len {
            Some((bribe, slot)) => reward_count(&results, slot, bribe)?,
            None => 0,
        };
        let fee_count = match fee_len {
            Some((fees, slot)) => reward_count(&results, slot, fees)?,
            None => 0,
        };

        // Round 2: vote checkpoint and reward token lists
        let mut batch = Batch::default();
        let checkpoint = match prior {
            Some((bribe, slot)) => {
                let index = required::<IReward::getPriorSupplyIndexCall>(&results, slot, bribe)?;
                Some((bribe, batch.push(bribe, IReward::supplyCheckpointsCall { index })))
            }
            None => None,
        };
        let first_bribe = batch.calls.len();
        if let Some(bribe) = gauge.bribe_reward {
            for i in 0..bribe_count {
                batch.push(bribe, IReward::rewardsCall { index: U256::from(i) });
            }
        }
        let first_fee = batch.calls.len();
        if let Some(fees) = gauge.fee_reward {
            for i in 0..fee_count {
                batch.push(fees, IReward::rewardsCall { index: U256::from(i) });
            }
        }
        let lists = self.run(batch).await?;

        let votes = match checkpoint {
            Some((bribe, slot)) => checkpoint_votes(&lists, slot, bribe, epoch_end)?,
            None => U256::ZERO,
        };
        let bribe_tokens = match gauge.bribe_reward {
            Some(bribe) => reward_tokens(&lists, first_bribe, bribe_count, bribe)?,
            None => Vec::new(),
        };
        let fee_tokens = match gauge.fee_reward {
            Some(fees) => reward_tokens(&lists, first_fee, fee_count, fees)?,
            None => Vec::new(),
        };

        // Round 3: per-token amounts for this epoch
        let mut batch = Batch::default();
        let epoch_start_arg = U256::from(ts);
        let push_amounts = |batch: &mut Batch, distributor: Option<Address>, tokens: &[Address]| {
            let first = batch.calls.len();
            if let Some(distributor) = distributor {
                for token in tokens {
                    batch.push(
                        distributor,
                        IReward::tokenRewardsPerEpochCall {
                            token: *token,
                            epochStart: epoch_start_arg,
                        },
                    );
                }
            }
            first
        };
        let bribe_amounts = push_amounts(&mut batch, gauge.bribe_reward, &bribe_tokens);
        let fee_amounts = push_amounts(&mut batch, gauge.fee_reward, &fee_tokens);
        let amounts = self.run(batch).await?;

        let bribes = match gauge.bribe_reward {
            Some(bribe) => reward_amounts(&amounts, bribe_amounts, bribe_tokens, bribe)?,
            None => Vec::new(),
        };
        let fees = match gauge.fee_reward {
            Some(distributor) => reward_amounts(&amounts, fee_amounts, fee_tokens, distributor)?,
            None => Vec::new(),
        };

        Ok(EpochSnapshot {
            votes,
            reward_rate,
            bribes,
            fees,
        })
    }
}
