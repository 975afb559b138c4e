//! Contract Interfaces and Constants
//!
//! ABIs for the collaborators `RpcState` reads from. Function signatures
//! follow the Velodrome v2 / Aerodrome contracts (basic pools, Slipstream
//! concentrated pools, voter, gauges and reward distributors).

use alloy_primitives::{address, Address};
use alloy_sol_types::sol;

/// Multicall3 (same address on every EVM chain)
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// Epoch length in seconds
pub const WEEK: u64 = 7 * 24 * 60 * 60;

/// Maximum calls per aggregate3 batch (keeps eth_call under gas caps)
pub const MAX_CALLS_PER_BATCH: usize = 250;

sol! {
    /// Multicall3 - deployed at same address on all EVM chains
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external payable returns (Result[] memory returnData);

        function getCurrentBlockTimestamp() external view returns (uint256 timestamp);
    }
}

sol! {
    interface IFactoryRegistry {
        function poolFactories() external view returns (address[] memory);
    }

    interface IPoolFactory {
        function allPoolsLength() external view returns (uint256);
        function allPools(uint256 index) external view returns (address);
        function getFee(address pool, bool stable) external view returns (uint256);
    }

    /// Basic (x*y / stable) pool
    interface IPool {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function stable() external view returns (bool);
        function factory() external view returns (address);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function poolFees() external view returns (address);
        function getReserves() external view returns (
            uint256 _reserve0, uint256 _reserve1, uint256 _blockTimestampLast
        );
    }

    /// Concentrated liquidity pool
    interface ICLPool {
        function tickSpacing() external view returns (int24);
        function liquidity() external view returns (uint128);
        function stakedLiquidity() external view returns (uint128);
        function fee() external view returns (uint24);
        function unstakedFee() external view returns (uint24);
        function gaugeFees() external view returns (uint128 token0, uint128 token1);
        function slot0() external view returns (
            uint160 sqrtPriceX96, int24 tick, uint16 observationIndex,
            uint16 observationCardinality, uint16 observationCardinalityNext,
            bool unlocked
        );
    }

    interface IVoter {
        function gauges(address pool) external view returns (address);
        function isAlive(address gauge) external view returns (bool);
        function isWhitelistedToken(address token) external view returns (bool);
        function gaugeToFees(address gauge) external view returns (address);
        function gaugeToBribe(address gauge) external view returns (address);
    }

    interface IGauge {
        function rewardToken() external view returns (address);
        function rewardRate() external view returns (uint256);
        function rewardRateByEpoch(uint256 epochStart) external view returns (uint256);
        function totalSupply() external view returns (uint256);
    }

    /// Bribe and fee reward distributors share this interface
    interface IReward {
        function rewardsListLength() external view returns (uint256);
        function rewards(uint256 index) external view returns (address);
        function tokenRewardsPerEpoch(address token, uint256 epochStart) external view returns (uint256);
        function supplyNumCheckpoints() external view returns (uint256);
        function supplyCheckpoints(uint256 index) external view returns (uint256 timestamp, uint256 supply);
        function getPriorSupplyIndex(uint256 timestamp) external view returns (uint256);
    }

    interface IERC20 {
        function symbol() external view returns (string memory);
        function name() external view returns (string memory);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
    }
}
