//! Chain event types and channel infrastructure.
//!
//! # Event flow
//!
//! 1. One `LogWatcher` per event kind polls the chain and decodes logs
//!    into [`ChainEvent`]s.
//! 2. All watchers feed the same channel; the `ProjectorRunner` drains
//!    it and applies each event to the publish store.
//!
//! Delivery from the chain is at-least-once and unordered across event
//! kinds; the projector's idempotency and ordering guards absorb both.

pub mod channels;
pub mod types;

pub use channels::{ChainEventReceiver, ChainEventSender, DEFAULT_CHANNEL_BUFFER, chain_event_channel};
pub use types::{
    ChainEvent, EventKind, LotteryCreated, LotteryDrawn, LotteryExpired, ProfitWithdrawn,
    TicketPurchased, Withdrawal,
};
