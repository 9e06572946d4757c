//! Event channel factories and handles.

use super::types::ChainEvent;
use tokio::sync::mpsc;

/// Default buffer size for the chain event channel.
///
/// Enough to absorb a burst of backfilled logs while keeping memory
/// bounded; watchers apply backpressure when the projector falls behind.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for ChainEvent. All watcher loops clone one of these.
pub type ChainEventSender = mpsc::Sender<ChainEvent>;
/// Receiver handle for ChainEvent, owned by the projector runner.
pub type ChainEventReceiver = mpsc::Receiver<ChainEvent>;

/// Create the chain event channel shared by all watchers.
pub fn chain_event_channel() -> (ChainEventSender, ChainEventReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
