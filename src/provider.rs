//! Abstraction over the remote chain provider (JSON-RPC node, gateway, ...).
//! Authentication, network selection, and transport live behind the trait.
use crate::block::{BlockHash, BlockHeader, LogEntry, LogFilter};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

/// Provider-level failure, split so retry policy is enforced by the type
/// system instead of string inspection of error codes.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,
    /// Transport-level failure (connection refused, reset, DNS, ...).
    #[error("network error: {0}")]
    Network(String),
    /// The provider answered with a server error.
    #[error("server error (status {0})")]
    Server(u16),
    /// The provider rejected the request; retrying the same call cannot help.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ProviderError {
    /// Whether the retry wrapper should back off and try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::Network(_) | ProviderError::Server(_)
        )
    }
}

/// Shorthand for provider call results.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Read access to the remote chain.
///
/// `header_by_number`/`header_by_hash` return `None` when the block is
/// unknown to the provider; the caller decides whether that is a race or an
/// invariant violation.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Current remote head.
    async fn latest_header(&self) -> ProviderResult<BlockHeader>;

    /// Header at an exact height on the provider's current canonical chain.
    async fn header_by_number(&self, number: u64) -> ProviderResult<Option<BlockHeader>>;

    /// Header with an exact hash, if the provider still knows it.
    async fn header_by_hash(&self, hash: &BlockHash) -> ProviderResult<Option<BlockHeader>>;

    /// Logs matching `filter` in the number-addressed range
    /// `[min_block, max_block]`. Only safe for heights the caller considers
    /// final; a reorg during the query yields silently different results.
    async fn logs_in_range(
        &self,
        filter: &LogFilter,
        min_block: u64,
        max_block: u64,
    ) -> ProviderResult<Vec<LogEntry>>;

    /// Logs matching `filter` in the single block identified by `block`.
    /// If the provider's chain has moved past that hash this fails loudly
    /// instead of returning data from a different block.
    async fn logs_in_block(
        &self,
        filter: &LogFilter,
        block: &BlockHash,
    ) -> ProviderResult<Vec<LogEntry>>;

    /// Push subscription for new remote head heights. Single-slot: a waiter
    /// observes the most recent height, not every intermediate one.
    fn height_updates(&self) -> watch::Receiver<u64>;
}
