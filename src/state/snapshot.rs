//! In-Memory Snapshot State
//!
//! A fixed, fully deterministic view of upstream state. Used for offline
//! serving (`SUGAR_SNAPSHOT=state.json`) and as the test double for the
//! aggregator. Addresses listed in `fail_on` make every read that touches
//! them fail, which is how upstream outages are simulated.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use eyre::{eyre, Result as EyreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{epoch_start, ChainState, EpochSnapshot, PoolSnapshot, TokenMetadata};
use crate::error::{Result, SugarError};

/// Account balance of a single token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub token: Address,
    pub account: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotState {
    /// Pools in registry index order
    pub pools: Vec<PoolSnapshot>,
    #[serde(default)]
    pub tokens: Vec<TokenMetadata>,
    /// Tokens whitelisted by the voter
    #[serde(default)]
    pub listed: HashSet<Address>,
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
    /// Recorded epochs per pool, keyed by epoch start
    #[serde(default)]
    pub epochs: HashMap<Address, BTreeMap<u64, EpochSnapshot>>,
    pub current_epoch_start: u64,
    #[serde(default)]
    pub fail_on: HashSet<Address>,
}

impl SnapshotState {
    pub fn new(now: u64) -> Self {
        Self {
            current_epoch_start: epoch_start(now),
            ..Default::default()
        }
    }

    /// Load a snapshot from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EyreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read snapshot {}: {}", path.display(), e))?;
        let mut state: Self = serde_json::from_str(&content)
            .map_err(|e| eyre!("Failed to parse snapshot {}: {}", path.display(), e))?;
        state.current_epoch_start = epoch_start(state.current_epoch_start);
        state.align_epochs();

        debug!(
            "Loaded snapshot {}: {} pools, {} tokens",
            path.display(),
            state.pools.len(),
            state.tokens.len()
        );
        Ok(state)
    }

    /// Re-key recorded epochs on the start of their weekly bucket
    fn align_epochs(&mut self) {
        for recorded in self.epochs.values_mut() {
            *recorded = std::mem::take(recorded)
                .into_iter()
                .map(|(ts, epoch)| (epoch_start(ts), epoch))
                .collect();
        }
    }

    pub fn with_pool(mut self, pool: PoolSnapshot) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn with_token(mut self, address: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens.push(TokenMetadata {
            address,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            decimals,
        });
        self
    }

    pub fn with_listed(mut self, token: Address) -> Self {
        self.listed.insert(token);
        self
    }

    pub fn with_balance(mut self, token: Address, account: Address, amount: U256) -> Self {
        self.balances.push(BalanceEntry {
            token,
            account,
            amount,
        });
        self
    }

    pub fn with_epoch(mut self, pool: Address, ts: u64, epoch: EpochSnapshot) -> Self {
        self.epochs
            .entry(pool)
            .or_default()
            .insert(epoch_start(ts), epoch);
        self
    }

    /// Make every read touching `address` fail
    pub fn fail_on(mut self, address: Address) -> Self {
        self.fail_on.insert(address);
        self
    }

    fn guard(&self, address: Address) -> Result<()> {
        if self.fail_on.contains(&address) {
            return Err(SugarError::upstream(address, "simulated read failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainState for SnapshotState {
    async fn pool_count(&self) -> Result<u64> {
        Ok(self.pools.len() as u64)
    }

    async fn pool_at(&self, index: u64) -> Result<Address> {
        let pool = self
            .pools
            .get(index as usize)
            .ok_or(SugarError::OutOfRange {
                index,
                size: self.pools.len() as u64,
            })?;
        self.guard(pool.address)?;
        Ok(pool.address)
    }

    async fn pool(&self, address: Address) -> Result<Option<PoolSnapshot>> {
        self.guard(address)?;
        Ok(self.pools.iter().find(|p| p.address == address).cloned())
    }

    async fn token(&self, address: Address) -> Result<Option<TokenMetadata>> {
        self.guard(address)?;
        Ok(self.tokens.iter().find(|t| t.address == address).cloned())
    }

    async fn is_listed(&self, token: Address) -> Result<bool> {
        self.guard(token)?;
        Ok(self.listed.contains(&token))
    }

    async fn balance_of(&self, token: Address, account: Address) -> Result<U256> {
        self.guard(token)?;
        self.guard(account)?;
        Ok(self
            .balances
            .iter()
            .find(|b| b.token == token && b.account == account)
            .map(|b| b.amount)
            .unwrap_or(U256::ZERO))
    }

    async fn current_epoch_start(&self) -> Result<u64> {
        Ok(self.current_epoch_start)
    }

    async fn epoch_history_start(&self, pool: &PoolSnapshot) -> Result<Option<u64>> {
        self.guard(pool.address)?;
        if pool.gauge.is_none() {
            return Ok(None);
        }
        Ok(self
            .epochs
            .get(&pool.address)
            .and_then(|recorded| recorded.keys().next().copied()))
    }

    async fn epoch(&self, pool: &PoolSnapshot, epoch_start: u64) -> Result<EpochSnapshot> {
        self.guard(pool.address)?;
        Ok(self
            .epochs
            .get(&pool.address)
            .and_then(|recorded| recorded.get(&epoch_start))
            .cloned()
            .unwrap_or_default())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_pool_lookup() {
        let state = snapshot();

        assert_eq!(tokio_test::block_on(state.pool_count()).unwrap(), 6);
        assert_eq!(
            tokio_test::block_on(state.pool_at(2)).unwrap(),
            pool_address(2)
        );

        let err = tokio_test::block_on(state.pool_at(6)).unwrap_err();
        assert_eq!(err, SugarError::OutOfRange { index: 6, size: 6 });

        let missing = tokio_test::block_on(state.pool(Address::repeat_byte(0x99))).unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_pool_range_default_impl() {
        let state = snapshot();
        let range = state.pool_range(1, 4).await.unwrap();
        assert_eq!(range, vec![pool_address(1), pool_address(2), pool_address(3)]);
    }

    #[tokio::test]
    async fn test_epoch_gaps_read_as_empty() {
        let state = snapshot();
        let pool = state.pool(pool_address(1)).await.unwrap().unwrap();

        assert_eq!(
            state.epoch_history_start(&pool).await.unwrap(),
            Some(EPOCH - 2 * crate::state::WEEK)
        );
        let gap = state.epoch(&pool, EPOCH - crate::state::WEEK).await.unwrap();
        assert_eq!(gap, EpochSnapshot::default());
    }

    #[tokio::test]
    async fn test_gaugeless_pool_has_no_history() {
        let state = snapshot();
        let pool = state.pool(pool_address(3)).await.unwrap().unwrap();
        assert_eq!(state.epoch_history_start(&pool).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fail_on() {
        let state = snapshot().fail_on(usdc());

        assert!(state.token(usdc()).await.unwrap_err().is_upstream());
        assert!(state.token(weth()).await.unwrap().is_some());
        assert!(state.balance_of(usdc(), account()).await.is_err());
    }

    #[test]
    fn test_json_round_trip_file() {
        let state = snapshot();
        let dir = std::env::temp_dir().join(format!("sugar-snapshot-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        fs::write(&path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

        let loaded = SnapshotState::from_json_file(&path).unwrap();
        assert_eq!(loaded.pools, state.pools);
        assert_eq!(loaded.epochs, state.epochs);
        assert_eq!(loaded.current_epoch_start, EPOCH);

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unaligned_epochs_realigned_on_load() {
        let mut state = snapshot();
        let mut recorded = BTreeMap::new();
        recorded.insert(
            EPOCH + 100,
            EpochSnapshot {
                votes: U256::from(77u64),
                ..Default::default()
            },
        );
        state.epochs.insert(pool_address(2), recorded);

        let path = std::env::temp_dir().join(format!("sugar-unaligned-{}.json", std::process::id()));
        fs::write(&path, serde_json::to_string(&state).unwrap()).unwrap();
        let loaded = SnapshotState::from_json_file(&path).unwrap();
        fs::remove_file(&path).ok();

        let pool = loaded.pool(pool_address(2)).await.unwrap().unwrap();
        assert_eq!(loaded.epoch_history_start(&pool).await.unwrap(), Some(EPOCH));
        assert_eq!(loaded.epoch(&pool, EPOCH).await.unwrap().votes, U256::from(77u64));

        let sugar = crate::sugar::Sugar::new(loaded, crate::deployments::known(8453).unwrap());
        let epochs = sugar.epochs_by_address(5, 0, pool_address(2)).await.unwrap();
        assert_eq!(epochs.len(), 1);
        assert_eq!((epochs[0].ts, epochs[0].votes), (EPOCH, U256::from(77u64)));
    }

    #[test]
    fn test_missing_file() {
        let err = SnapshotState::from_json_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read snapshot"));
    }
}
