//! Known Deployments
//!
//! Collaborator addresses the aggregator reads from, per chain.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Base mainnet
pub const BASE_CHAIN_ID: u64 = 8453;

/// Collaborators behind a Sugar deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Gauge voter (gauges, liveness, token whitelist, reward distributors)
    pub voter: Address,
    /// Pool factory registry
    pub registry: Address,
    /// Legacy pool convertor
    pub convertor: Address,
    /// Concentrated liquidity NFT position manager
    pub nfpm: Address,
    /// Concentrated liquidity math helper
    pub cl_helper: Address,
}

/// Deployment for a chain, if one is known
pub fn known(chain_id: u64) -> Option<Deployment> {
    match chain_id {
        BASE_CHAIN_ID => Some(Deployment {
            voter: address!("16613524e02ad97eDfeF371bC883F2F5d6C480A5"),
            registry: address!("5C3F18F06CC09CA1910767A34a20F771039E37C0"),
            convertor: address!("1111111111111111111111111111111111111111"),
            nfpm: address!("827922686190790b37229fd06084350E74485b72"),
            cl_helper: address!("6d2D739bf37dFd93D804523c2dfA948EAf32f8E1"),
        }),
        _ => None,
    }
}
