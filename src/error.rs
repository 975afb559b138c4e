//! Sugar Error Taxonomy
//!
//! Listing-style reads are permissive: unknown pools or missing epochs come
//! back as empty results, never as errors. Everything else surfaces here.

use alloy_primitives::Address;

/// Result alias used by the aggregator and every state accessor
pub type Result<T> = std::result::Result<T, SugarError>;

/// Errors returned by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SugarError {
    /// Bad pagination bounds (limit above the page bound)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Index lookup beyond the collection size
    #[error("index {index} out of range (collection size {size})")]
    OutOfRange { index: u64, size: u64 },

    /// A collaborator read failed; the message is passed through verbatim
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// 256-bit reward arithmetic overflowed
    #[error("arithmetic overflow while computing {0}")]
    ArithmeticOverflow(&'static str),
}

impl SugarError {
    /// Upstream failure for a read that targeted a specific contract
    pub fn upstream(target: Address, what: impl std::fmt::Display) -> Self {
        SugarError::UpstreamUnavailable(format!("{:?}: {}", target, what))
    }

    /// Check a requested page size against its bound
    pub fn check_limit(limit: usize, max: usize) -> Result<()> {
        if limit > max {
            return Err(SugarError::InvalidArgument(format!(
                "limit {} exceeds page bound {}",
                limit, max
            )));
        }
        Ok(())
    }

    /// Whether this error came from a collaborator read
    pub fn is_upstream(&self) -> bool {
        matches!(self, SugarError::UpstreamUnavailable(_))
    }
}
