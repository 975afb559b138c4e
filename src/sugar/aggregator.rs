//! The Aggregator
//!
//! Stateless projections over a [`ChainState`]. Every call reads the
//! accessor afresh; ordering is deterministic for a fixed snapshot only.
//!
//! Pagination follows one rule everywhere: `offset` skips items of the
//! sequence being listed, `limit` bounds how many come back, and a short
//! page means the sequence ended.

use alloy_primitives::Address;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

use super::types::*;
use crate::deployments::Deployment;
use crate::error::{Result, SugarError};
use crate::state::{
    epoch_start, registered_pool, registered_pools, ChainState, PoolSnapshot, TokenMetadata, WEEK,
};

/// Which tokens `tokens()` returns when no explicit address list is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// Every token with valid metadata
    #[default]
    All,
    /// Only tokens whitelisted by the voter
    ListedOnly,
}

impl std::fmt::Display for TokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPolicy::All => write!(f, "ALL"),
            TokenPolicy::ListedOnly => write!(f, "LISTED_ONLY"),
        }
    }
}

/// Read-only LP data aggregator
pub struct Sugar<S> {
    state: S,
    deployment: Deployment,
    token_policy: TokenPolicy,
}

impl<S: ChainState> Sugar<S> {
    pub fn new(state: S, deployment: Deployment) -> Self {
        Self {
            state,
            deployment,
            token_policy: TokenPolicy::default(),
        }
    }

    pub fn with_token_policy(mut self, token_policy: TokenPolicy) -> Self {
        self.token_policy = token_policy;
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Collaborators this aggregator reads from
    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    /// Largest `limit` accepted by the pool listings
    pub fn max_lps(&self) -> usize {
        MAX_LPS
    }

    // ============================================
    // POOL LOOKUP
    // ============================================

    /// Pool at global position `index`
    pub async fn by_index(&self, index: u64) -> Result<Lp> {
        let size = self.state.pool_count().await?;
        if index >= size {
            return Err(SugarError::OutOfRange { index, size });
        }

        let address = self.state.pool_at(index).await?;
        let pool = registered_pool(&self.state, address).await?;
        Lp::project(&pool)
    }

    /// Pool by address, `None` when the registry does not know it
    pub async fn by_address(&self, address: Address) -> Result<Option<Lp>> {
        match self.state.pool(address).await? {
            Some(pool) => Lp::project(&pool).map(Some),
            None => Ok(None),
        }
    }

    // ============================================
    // POOL LISTINGS
    // ============================================

    /// Up to `limit` pools starting at global index `offset`
    pub async fn all(&self, limit: usize, offset: usize) -> Result<Vec<Lp>> {
        SugarError::check_limit(limit, MAX_LPS)?;
        let started = Instant::now();

        let pools = self.pool_window(limit, offset).await?;
        let lps = pools.iter().map(Lp::project).collect::<Result<Vec<_>>>()?;

        debug!(
            "all({}, {}): {} pools in {:?}",
            limit,
            offset,
            lps.len(),
            started.elapsed()
        );
        Ok(lps)
    }

    /// Up to `limit` swap-eligible pools, skipping the first `offset` eligible ones
    pub async fn for_swaps(&self, limit: usize, offset: usize) -> Result<Vec<SwapLp>> {
        SugarError::check_limit(limit, MAX_LPS)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let size = self.state.pool_count().await?;
        let mut skipped = 0usize;
        let mut scanned = 0u64;
        let mut swaps = Vec::with_capacity(limit);

        'scan: while scanned < size {
            // Each pool yields at most one entry
            let wanted = (limit - swaps.len()).saturating_add(offset - skipped);
            let end = (scanned + wanted.min(MAX_LPS) as u64).min(size);
            let pools = self.pools_in(scanned, end).await?;
            scanned = end;

            for pool in pools.iter().filter(|p| SwapLp::eligible(p)) {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                swaps.push(SwapLp::project(pool));
                if swaps.len() == limit {
                    break 'scan;
                }
            }
        }

        debug!(
            "for_swaps({}, {}): {} pools after scanning {} of {}",
            limit,
            offset,
            swaps.len(),
            scanned,
            size
        );
        Ok(swaps)
    }

    // ============================================
    // TOKENS
    // ============================================

    /// Tokens referenced by known pools, in first-seen order
    ///
    /// A non-empty `addresses` restricts the listing to those tokens and
    /// bypasses the token policy. With an `account`, each token carries
    /// that account's balance.
    pub async fn tokens(
        &self,
        limit: usize,
        offset: usize,
        account: Option<Address>,
        addresses: &[Address],
    ) -> Result<Vec<Token>> {
        SugarError::check_limit(limit, MAX_TOKENS)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let allowed: HashSet<Address> = addresses.iter().copied().collect();
        let apply_policy = allowed.is_empty();
        let size = self.state.pool_count().await?;

        let mut seen: HashSet<Address> = HashSet::new();
        let mut skipped = 0usize;
        let mut scanned = 0u64;
        let mut tokens = Vec::with_capacity(limit);

        'scan: while scanned < size {
            // Each pool yields at most two entries
            let wanted = (limit - tokens.len()).saturating_add(offset - skipped);
            let end = (scanned + wanted.div_ceil(2).min(MAX_LPS) as u64).min(size);
            let pools = self.pools_in(scanned, end).await?;
            scanned = end;

            let candidates: Vec<Address> = pools
                .iter()
                .flat_map(|p| [p.token0, p.token1])
                .filter(|token| seen.insert(*token))
                .filter(|token| allowed.is_empty() || allowed.contains(token))
                .collect();

            for token in self.resolve_tokens(&candidates, apply_policy).await {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                tokens.push(token);
                if tokens.len() == limit {
                    break 'scan;
                }
            }

            if !allowed.is_empty() && allowed.iter().all(|token| seen.contains(token)) {
                break;
            }
        }

        if let Some(account) = account {
            let balances = try_join_all(
                tokens
                    .iter()
                    .map(|token| self.state.balance_of(token.token_address, account)),
            )
            .await?;
            for (token, balance) in tokens.iter_mut().zip(balances) {
                token.account_balance = balance;
            }
        }

        debug!(
            "tokens({}, {}): {} tokens from {} pools",
            limit,
            offset,
            tokens.len(),
            scanned
        );
        Ok(tokens)
    }

    /// Token records for `candidates` in order, leaving out tokens that must not be listed
    async fn resolve_tokens(&self, candidates: &[Address], apply_policy: bool) -> Vec<Token> {
        let metadata = self.state.tokens(candidates).await;
        let valid: Vec<TokenMetadata> = candidates
            .iter()
            .zip(metadata)
            .filter_map(|(address, metadata)| valid_metadata(*address, metadata))
            .collect();

        let addresses: Vec<Address> = valid.iter().map(|m| m.address).collect();
        let listed = self.state.listed(&addresses).await;

        valid
            .into_iter()
            .zip(listed)
            .filter_map(|(metadata, listed)| {
                let listed = match listed {
                    Ok(listed) => listed,
                    Err(e) => {
                        warn!("Skipping token {:?}: {}", metadata.address, e);
                        return None;
                    }
                };
                if apply_policy && self.token_policy == TokenPolicy::ListedOnly && !listed {
                    return None;
                }
                Some(Token {
                    token_address: metadata.address,
                    symbol: metadata.symbol,
                    decimals: metadata.decimals,
                    account_balance: Default::default(),
                    listed,
                })
            })
            .collect()
    }

    // ============================================
    // EPOCHS
    // ============================================

    /// Epochs of one pool, newest first, skipping the `offset` most recent
    pub async fn epochs_by_address(
        &self,
        limit: usize,
        offset: usize,
        address: Address,
    ) -> Result<Vec<LpEpoch>> {
        SugarError::check_limit(limit, MAX_EPOCHS)?;

        let Some(pool) = self.state.pool(address).await? else {
            debug!("epochs_by_address: {:?} is not a known pool", address);
            return Ok(Vec::new());
        };
        self.pool_epochs(&pool, limit, offset).await
    }

    /// Latest epoch for each pool in the window `offset..offset + limit`
    ///
    /// Pools without recorded epochs contribute nothing, so the result may
    /// be shorter than the window.
    pub async fn epochs_latest(&self, limit: usize, offset: usize) -> Result<Vec<LpEpoch>> {
        SugarError::check_limit(limit, MAX_LPS)?;

        let pools = self.pool_window(limit, offset).await?;
        let latest = try_join_all(pools.iter().map(|pool| self.pool_epochs(pool, 1, 0))).await?;

        Ok(latest.into_iter().flatten().collect())
    }

    async fn pool_epochs(
        &self,
        pool: &PoolSnapshot,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LpEpoch>> {
        if limit == 0 || pool.gauge.is_none() {
            return Ok(Vec::new());
        }
        let Some(first) = self.state.epoch_history_start(pool).await? else {
            return Ok(Vec::new());
        };

        let first = epoch_start(first);
        let current = self.state.current_epoch_start().await?;
        if first > current {
            return Ok(Vec::new());
        }

        let total = (current - first) / WEEK + 1;
        let start = (offset as u64).min(total);
        let end = start.saturating_add(limit as u64).min(total);
        let buckets: Vec<u64> = (start..end).map(|weeks| current - weeks * WEEK).collect();

        let epochs = try_join_all(buckets.iter().map(|ts| self.state.epoch(pool, *ts))).await?;

        buckets
            .into_iter()
            .zip(epochs.iter())
            .map(|(ts, epoch)| LpEpoch::project(pool.address, ts, epoch))
            .collect()
    }

    // ============================================
    // HELPERS
    // ============================================

    /// Pools at global positions `offset..offset + limit`, clamped to the registry
    async fn pool_window(&self, limit: usize, offset: usize) -> Result<Vec<PoolSnapshot>> {
        let size = self.state.pool_count().await?;
        let start = (offset as u64).min(size);
        let end = start.saturating_add(limit as u64).min(size);
        self.pools_in(start, end).await
    }

    async fn pools_in(&self, start: u64, end: u64) -> Result<Vec<PoolSnapshot>> {
        if start >= end {
            return Ok(Vec::new());
        }
        let addresses = self.state.pool_range(start, end).await?;
        registered_pools(&self.state, &addresses).await
    }
}

/// Metadata fit for listing, or `None` with the reason logged
fn valid_metadata(address: Address, metadata: Result<Option<TokenMetadata>>) -> Option<TokenMetadata> {
    match metadata {
        Ok(Some(metadata)) if metadata.is_valid() => Some(metadata),
        Ok(Some(metadata)) => {
            debug!(
                "Skipping token {:?}: invalid metadata (symbol {:?}, decimals {})",
                address, metadata.symbol, metadata.decimals
            );
            None
        }
        Ok(None) => {
            debug!("Skipping token {:?}: no metadata", address);
            None
        }
        Err(e) => {
            warn!("Skipping token {:?}: {}", address, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployments;
    use crate::state::fixtures::*;
    use crate::state::SnapshotState;
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn sugar() -> Sugar<SnapshotState> {
        sugar_over(snapshot())
    }

    fn sugar_over(state: SnapshotState) -> Sugar<SnapshotState> {
        Sugar::new(state, deployments::known(deployments::BASE_CHAIN_ID).unwrap())
    }

    fn lp_addresses(lps: &[Lp]) -> Vec<Address> {
        lps.iter().map(|lp| lp.lp).collect()
    }

    #[test]
    fn test_deployment() {
        let sugar = sugar();
        assert_eq!(
            sugar.deployment().voter,
            "0x16613524e02ad97eDfeF371bC883F2F5d6C480A5".parse::<Address>().unwrap()
        );
        assert_eq!(
            sugar.deployment().cl_helper,
            "0x6d2D739bf37dFd93D804523c2dfA948EAf32f8E1".parse::<Address>().unwrap()
        );
        assert_eq!(sugar.max_lps(), MAX_LPS);
    }

    // ========== Pool lookup ==========

    #[tokio::test]
    async fn test_by_index() {
        let sugar = sugar();
        let lp = sugar.by_index(0).await.unwrap();

        assert_eq!(lp.lp, pool_address(0));
        assert_eq!(lp.gauge, Some(gauge_address(0)));
        assert!(lp.gauge_alive);
        assert_eq!((lp.token0, lp.token1), (weth(), usdc()));
    }

    #[tokio::test]
    async fn test_by_index_every_pool() {
        let sugar = sugar();
        for index in 0..6u64 {
            let lp = sugar.by_index(index).await.unwrap();
            assert_eq!(lp.lp, pool_address(index as u8));
            // Deterministic for a fixed snapshot
            assert_eq!(sugar.by_index(index).await.unwrap(), lp);
        }
    }

    #[tokio::test]
    async fn test_by_index_out_of_range() {
        let err = sugar().by_index(6).await.unwrap_err();
        assert_eq!(err, SugarError::OutOfRange { index: 6, size: 6 });
    }

    #[tokio::test]
    async fn test_by_address() {
        let sugar = sugar();
        let lp = sugar.by_address(pool_address(2)).await.unwrap().unwrap();
        assert_eq!(lp.pool_type, crate::state::PoolKind::Concentrated { tick_spacing: 100 });

        assert!(sugar.by_address(weth()).await.unwrap().is_none());
    }

    // ========== Listings ==========

    #[tokio::test]
    async fn test_all_matches_by_index() {
        let sugar = sugar();
        let first = sugar.by_index(0).await.unwrap();
        let second = sugar.by_index(1).await.unwrap();

        let lps = sugar.all(10, 0).await.unwrap();
        assert_eq!(lps.len(), 6);
        assert_eq!(lps[0], first);
        assert_eq!(lps[1].lp, second.lp);
        assert_eq!(lps[1].gauge, second.gauge);
    }

    #[tokio::test]
    async fn test_all_limit_offset() {
        let sugar = sugar();
        let second = sugar.by_index(1).await.unwrap();

        let lps = sugar.all(1, 1).await.unwrap();
        assert_eq!(lps, vec![second]);
    }

    #[tokio::test]
    async fn test_all_pagination_is_contiguous() {
        let sugar = sugar();
        let full = sugar.all(6, 0).await.unwrap();

        let mut paged = sugar.all(3, 0).await.unwrap();
        paged.extend(sugar.all(3, 3).await.unwrap());
        assert_eq!(lp_addresses(&paged), lp_addresses(&full));

        let mut odd = Vec::new();
        for offset in (0..6).step_by(4) {
            odd.extend(sugar.all(4, offset).await.unwrap());
        }
        assert_eq!(odd, full);
    }

    #[tokio::test]
    async fn test_all_short_page_only_at_end() {
        let sugar = sugar();
        assert_eq!(sugar.all(4, 4).await.unwrap().len(), 2);
        assert!(sugar.all(4, 6).await.unwrap().is_empty());
        assert!(sugar.all(4, usize::MAX).await.unwrap().is_empty());
        assert!(sugar.all(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_max_page() {
        let sugar = sugar();
        assert_eq!(sugar.all(MAX_LPS, 0).await.unwrap().len(), 6);

        let err = sugar.all(MAX_LPS + 1, 0).await.unwrap_err();
        assert!(matches!(err, SugarError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_pool_listings_reject_oversized_limit() {
        let sugar = sugar();
        assert_eq!(sugar.for_swaps(MAX_LPS, 0).await.unwrap().len(), 5);
        assert_eq!(sugar.epochs_latest(MAX_LPS, 0).await.unwrap().len(), 3);

        assert!(matches!(
            sugar.for_swaps(MAX_LPS + 1, 0).await,
            Err(SugarError::InvalidArgument(_))
        ));
        assert!(matches!(
            sugar.epochs_latest(MAX_LPS + 1, 0).await,
            Err(SugarError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_for_swaps_agrees_with_all() {
        let sugar = sugar();
        let lps = sugar.all(10, 0).await.unwrap();
        let swaps = sugar.for_swaps(10, 0).await.unwrap();

        assert!(swaps.len() > 1);
        assert_eq!(swaps[0].lp, lps[0].lp);
        assert_eq!(swaps[1].lp, lps[1].lp);
    }

    #[tokio::test]
    async fn test_for_swaps_skips_empty_pools() {
        let sugar = sugar();
        let swaps = sugar.for_swaps(10, 0).await.unwrap();

        let addresses: Vec<Address> = swaps.iter().map(|s| s.lp).collect();
        assert_eq!(
            addresses,
            vec![pool_address(0), pool_address(1), pool_address(2), pool_address(4), pool_address(5)]
        );
    }

    #[tokio::test]
    async fn test_for_swaps_offset_counts_eligible_pools() {
        let sugar = sugar();

        let page = sugar.for_swaps(2, 2).await.unwrap();
        assert_eq!(page.iter().map(|s| s.lp).collect::<Vec<_>>(), vec![pool_address(2), pool_address(4)]);

        let tail = sugar.for_swaps(10, 4).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].lp, pool_address(5));

        assert!(sugar.for_swaps(10, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_for_swaps_pagination_is_contiguous() {
        let sugar = sugar();
        let full = sugar.for_swaps(4, 0).await.unwrap();

        let mut paged = sugar.for_swaps(2, 0).await.unwrap();
        paged.extend(sugar.for_swaps(2, 2).await.unwrap());
        assert_eq!(paged, full);

        let mut singles = Vec::new();
        for offset in 0..5 {
            singles.extend(sugar.for_swaps(1, offset).await.unwrap());
        }
        assert_eq!(singles, sugar.for_swaps(5, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_for_swaps_stops_reading_once_filled() {
        // The last pool cannot be read; pages that end before it still succeed
        let sugar = sugar_over(snapshot().fail_on(pool_address(5)));

        assert_eq!(sugar.for_swaps(1, 0).await.unwrap()[0].lp, pool_address(0));
        let page = sugar.for_swaps(4, 0).await.unwrap();
        assert_eq!(page.last().unwrap().lp, pool_address(4));
        assert_eq!(sugar.for_swaps(1, 3).await.unwrap()[0].lp, pool_address(4));

        assert!(sugar.for_swaps(5, 0).await.unwrap_err().is_upstream());
        assert!(sugar.for_swaps(1, 4).await.unwrap_err().is_upstream());
    }

    #[tokio::test]
    async fn test_listing_fails_on_upstream_error() {
        let sugar = sugar_over(snapshot().fail_on(pool_address(2)));

        assert!(sugar.all(10, 0).await.unwrap_err().is_upstream());
        assert!(sugar.for_swaps(10, 0).await.unwrap_err().is_upstream());
        // Window that does not touch the failing pool still works
        assert_eq!(sugar.all(2, 0).await.unwrap().len(), 2);
    }

    // ========== Tokens ==========

    #[tokio::test]
    async fn test_tokens_follow_first_pool() {
        let sugar = sugar();
        let first = sugar.by_index(0).await.unwrap();
        let tokens = sugar.tokens(10, 0, None, &[]).await.unwrap();

        assert!(tokens.len() > 1);
        assert_eq!(tokens[0].token_address, first.token0);
        assert_eq!(tokens[1].token_address, first.token1);
        assert!(tokens.iter().all(|t| t.decimals > 0 && !t.symbol.is_empty()));
    }

    #[tokio::test]
    async fn test_tokens_exclude_bad_metadata() {
        let tokens = sugar().tokens(10, 0, None, &[]).await.unwrap();
        let symbols: Vec<&str> = tokens.iter().map(|t| t.symbol.as_str()).collect();

        // broken (0 decimals), blank (no symbol) and unknown (no metadata) are left out
        assert_eq!(symbols, vec!["WETH", "USDC", "AERO"]);
        assert!(tokens.iter().all(|t| t.account_balance == U256::ZERO));
    }

    #[tokio::test]
    async fn test_tokens_pagination() {
        let sugar = sugar();
        let page = sugar.tokens(1, 1, None, &[]).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].token_address, usdc());

        assert!(sugar.tokens(5, 3, None, &[]).await.unwrap().is_empty());
        assert!(matches!(
            sugar.tokens(MAX_TOKENS + 1, 0, None, &[]).await,
            Err(SugarError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_tokens_account_balances() {
        let tokens = sugar().tokens(10, 0, Some(account()), &[]).await.unwrap();

        let usdc_token = tokens.iter().find(|t| t.token_address == usdc()).unwrap();
        assert_eq!(usdc_token.account_balance, U256::from(1_234u64));
        let weth_token = tokens.iter().find(|t| t.token_address == weth()).unwrap();
        assert_eq!(weth_token.account_balance, U256::ZERO);
    }

    #[tokio::test]
    async fn test_tokens_address_list_restricts() {
        let tokens = sugar()
            .tokens(10, 0, None, &[aero(), broken()])
            .await
            .unwrap();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_address, aero());
        assert!(!tokens[0].listed);
    }

    #[tokio::test]
    async fn test_tokens_listed_only_policy() {
        let sugar = sugar().with_token_policy(TokenPolicy::ListedOnly);

        let tokens = sugar.tokens(10, 0, None, &[]).await.unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.token_address).collect::<Vec<_>>(),
            vec![weth(), usdc()]
        );
        assert!(tokens.iter().all(|t| t.listed));

        // An explicit address list bypasses the policy
        let explicit = sugar.tokens(10, 0, None, &[aero()]).await.unwrap();
        assert_eq!(explicit.len(), 1);
    }

    #[tokio::test]
    async fn test_tokens_metadata_failure_is_excluded() {
        let sugar = sugar_over(snapshot().fail_on(aero()));
        let tokens = sugar.tokens(10, 0, None, &[]).await.unwrap();

        assert_eq!(
            tokens.iter().map(|t| t.token_address).collect::<Vec<_>>(),
            vec![weth(), usdc()]
        );
    }

    #[tokio::test]
    async fn test_tokens_stop_reading_once_filled() {
        let sugar = sugar_over(snapshot().fail_on(pool_address(5)));

        let first = sugar.tokens(1, 0, None, &[]).await.unwrap();
        assert_eq!(first[0].token_address, weth());
        let three = sugar.tokens(3, 0, None, &[]).await.unwrap();
        assert_eq!(
            three.iter().map(|t| t.token_address).collect::<Vec<_>>(),
            vec![weth(), usdc(), aero()]
        );

        // Only three listable tokens exist, so a fourth forces the full scan
        assert!(sugar.tokens(4, 0, None, &[]).await.unwrap_err().is_upstream());
    }

    // ========== Epochs ==========

    #[tokio::test]
    async fn test_epochs_by_address_limit_offset() {
        let sugar = sugar();
        let first = sugar.by_index(0).await.unwrap();

        let latest = sugar.epochs_by_address(20, 0, first.lp).await.unwrap();
        let epochs = sugar.epochs_by_address(20, 3, first.lp).await.unwrap();

        assert_eq!(latest.len(), 15);
        assert_eq!(epochs.len(), 12);
        assert!(epochs.len() > 10);
        assert_eq!(epochs[0], latest[3]);

        let epoch = &epochs[1];
        assert_eq!(epoch.lp, first.lp);
        assert!(epoch.votes > U256::ZERO);
        assert!(epoch.emissions > U256::ZERO);
        assert!(epoch.bribes.iter().all(|b| b.amount > U256::ZERO));
        assert!(epoch.fees.iter().all(|f| f.amount > U256::ZERO));

        for older in &epochs {
            assert!(older.ts < latest[0].ts);
        }
    }

    #[tokio::test]
    async fn test_epochs_are_newest_first_weekly() {
        let epochs = sugar().epochs_by_address(20, 0, pool_address(0)).await.unwrap();

        assert_eq!(epochs[0].ts, EPOCH);
        for pair in epochs.windows(2) {
            assert_eq!(pair[0].ts - pair[1].ts, WEEK);
        }
    }

    #[tokio::test]
    async fn test_epoch_rewards_resolved() {
        let epochs = sugar().epochs_by_address(1, 0, pool_address(0)).await.unwrap();
        let epoch = &epochs[0];

        // 50 + 5 AERO merged, zero WETH bribe dropped
        assert_eq!(epoch.bribes.len(), 1);
        assert_eq!(epoch.bribes[0].token, aero());
        assert_eq!(epoch.bribes[0].amount, U256::from(55u64));
        assert_eq!(epoch.fees.len(), 2);
        assert_eq!(epoch.votes, U256::from(100u64));
        assert_eq!(epoch.emissions, U256::from(10 * WEEK));
    }

    #[tokio::test]
    async fn test_epoch_gap_reads_as_empty_bucket() {
        let epochs = sugar().epochs_by_address(10, 0, pool_address(1)).await.unwrap();

        assert_eq!(
            epochs.iter().map(|e| e.ts).collect::<Vec<_>>(),
            vec![EPOCH, EPOCH - WEEK, EPOCH - 2 * WEEK]
        );
        assert_eq!(epochs[1].votes, U256::ZERO);
        assert_eq!(epochs[1].emissions, U256::ZERO);
        assert!(epochs[1].bribes.is_empty() && epochs[1].fees.is_empty());
    }

    #[tokio::test]
    async fn test_epochs_permissive_reads() {
        let sugar = sugar();

        // Unknown address, pool without gauge, gauge without history
        assert!(sugar.epochs_by_address(10, 0, weth()).await.unwrap().is_empty());
        assert!(sugar.epochs_by_address(10, 0, pool_address(3)).await.unwrap().is_empty());
        assert!(sugar.epochs_by_address(10, 0, pool_address(4)).await.unwrap().is_empty());
        // Offset past the history
        assert!(sugar.epochs_by_address(10, 15, pool_address(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_epochs_bounds() {
        let sugar = sugar();
        assert_eq!(
            sugar.epochs_by_address(MAX_EPOCHS, 0, pool_address(0)).await.unwrap().len(),
            15
        );
        assert!(matches!(
            sugar.epochs_by_address(MAX_EPOCHS + 1, 0, pool_address(0)).await,
            Err(SugarError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_epochs_latest_agrees_with_by_address() {
        let sugar = sugar();
        let second = sugar.by_index(1).await.unwrap();

        let by_address = sugar.epochs_by_address(1, 0, second.lp).await.unwrap();
        let latest = sugar.epochs_latest(1, 1).await.unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].lp, by_address[0].lp);
        assert_eq!(latest[0].ts, by_address[0].ts);
        assert_eq!(latest[0], by_address[0]);
    }

    #[tokio::test]
    async fn test_epochs_latest_paginates_over_pools() {
        let sugar = sugar();

        let latest = sugar.epochs_latest(10, 0).await.unwrap();
        assert_eq!(
            latest.iter().map(|e| e.lp).collect::<Vec<_>>(),
            vec![pool_address(0), pool_address(1), pool_address(2)]
        );
        assert!(latest.iter().all(|e| e.ts == EPOCH));

        // Window over pools 3..6 holds no recorded epochs
        assert!(sugar.epochs_latest(3, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_epochs_upstream_failure() {
        let sugar = sugar_over(snapshot().fail_on(pool_address(0)));
        assert!(sugar
            .epochs_by_address(5, 0, pool_address(0))
            .await
            .unwrap_err()
            .is_upstream());
    }

    // ========== Concurrency ==========

    #[tokio::test]
    async fn test_parallel_reads() {
        let sugar = Arc::new(sugar());

        let handles: Vec<_> = (0..4usize)
            .map(|offset| {
                let sugar = Arc::clone(&sugar);
                tokio::spawn(async move { sugar.all(2, offset).await })
            })
            .collect();

        for (offset, handle) in handles.into_iter().enumerate() {
            let page = handle.await.unwrap().unwrap();
            assert_eq!(page[0].lp, pool_address(offset as u8));
        }
    }
}
