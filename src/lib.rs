//! Sugar: read-only LP data aggregator for ve(3,3) DEX deployments
//!
//! Pools, tokens and weekly epoch rewards are read through a
//! [`state::ChainState`] accessor and projected into fixed-shape records.

pub mod config;
pub mod deployments;
pub mod error;
pub mod state;
pub mod sugar;

pub use config::Config;
pub use deployments::Deployment;
pub use error::{Result, SugarError};
pub use state::{ChainState, RpcState, SnapshotState};
pub use sugar::{Lp, LpEpoch, LpEpochReward, Sugar, SwapLp, Token, TokenPolicy};
