//! Activity notifications.
//!
//! A notification is an immutable, append-only fact about one entity
//! transition, broadcast on the `global:activity` channel (and, for
//! winner announcements, attached to the entity stream as well).
//! Delivery is at-least-once, so consumers dedupe on
//! [`ActivityNotification::dedup_key`].

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// The payload of one activity notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityKind {
    LotteryCreated {
        creator: Address,
        ticket_price: U256,
        prize_amount: U256,
        deadline: i64,
    },
    TicketPurchased {
        buyer: Address,
        tickets_sold: u64,
        pot: U256,
    },
    WinnerAnnounced {
        winner: Address,
        payout_winner: U256,
        creator_profit: U256,
    },
    LotteryExpired,
}

impl ActivityKind {
    /// Stable name used in logs and dedup keys.
    pub fn name(&self) -> &'static str {
        match self {
            ActivityKind::LotteryCreated { .. } => "lottery_created",
            ActivityKind::TicketPurchased { .. } => "ticket_purchased",
            ActivityKind::WinnerAnnounced { .. } => "winner_announced",
            ActivityKind::LotteryExpired => "lottery_expired",
        }
    }
}

/// One entity-level transition observed by the projector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityNotification {
    pub lottery_id: u64,
    /// Arrival time at the projector, unix milliseconds. This is the
    /// ordering key for activity feeds; the store has no total order
    /// across keys, so chain order is not used here.
    pub observed_at: i64,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

impl ActivityNotification {
    /// Identity under at-least-once delivery: a redelivered notification
    /// carries the same kind, entity, and observation time.
    pub fn dedup_key(&self) -> (&'static str, u64, i64) {
        (self.kind.name(), self.lottery_id, self.observed_at)
    }
}
