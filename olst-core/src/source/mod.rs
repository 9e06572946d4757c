//! The event source boundary.
//!
//! The chain is an external collaborator: the pipeline consumes its log
//! stream (see [`crate::watcher`]) and its synchronous point-read
//! interface, defined here as [`LotterySource`]. Reads through this
//! trait are the only authoritative ground truth in the system; the
//! publish store is merely a push cache layered on top.

use async_trait::async_trait;
use olst_sdk::objects::lottery::LotterySnapshot;
use std::time::Duration;

pub mod mock;
pub mod rpc;

pub use rpc::RpcLotterySource;

/// Errors from the event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP transport failure.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The RPC node returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response could not be decoded.
    #[error("response parsing error: {0}")]
    Parse(String),

    /// No lottery exists under this id.
    #[error("lottery {0} not found")]
    NotFound(u64),

    /// An authoritative read exceeded its deadline. Network blips are
    /// expected in an RPC context; this is retryable, not permanent.
    #[error("authoritative read timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Transient I/O worth retrying with backoff; parse failures and
    /// missing entities are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Request(_) | SourceError::Timeout(_) | SourceError::Rpc { .. }
        )
    }
}

/// Authoritative point reads against the lottery contract.
#[async_trait]
pub trait LotterySource: Send + Sync {
    /// Read the full current state of one lottery.
    async fn lottery(&self, id: u64) -> Result<LotterySnapshot, SourceError>;

    /// Total number of lotteries ever created.
    async fn lottery_count(&self) -> Result<u64, SourceError>;
}
