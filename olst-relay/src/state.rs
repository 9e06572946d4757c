//! Application state shared across all request handlers.

use olst_core::source::RpcLotterySource;
use olst_core::store::PublishStore;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// The publish store the projector writes into.
    pub store: Arc<PublishStore>,
    /// Authoritative contract reads.
    pub source: Arc<RpcLotterySource>,
}

impl AppState {
    pub fn new(store: Arc<PublishStore>, source: Arc<RpcLotterySource>) -> Self {
        Self { store, source }
    }
}
