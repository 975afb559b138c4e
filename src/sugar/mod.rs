//! LP Sugar
//!
//! Paginated, read-only views over liquidity pools, their tokens and their
//! epoch rewards.

mod aggregator;
mod types;

pub use aggregator::{Sugar, TokenPolicy};
pub use types::*;
