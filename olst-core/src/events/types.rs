//! Chain event type definitions.
//!
//! Each type mirrors one contract event's field shape. Values are
//! absolute ("the new total is N"), never incremental, which is what
//! makes redelivery a no-op at the projector.

use alloy_primitives::{Address, U256};

/// A new lottery was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryCreated {
    pub id: u64,
    pub creator: Address,
    pub ticket_price: U256,
    pub prize_amount: U256,
    /// Absolute unix timestamp (seconds).
    pub buy_deadline: i64,
}

/// A ticket was bought; carries the new totals, not deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketPurchased {
    pub id: u64,
    pub buyer: Address,
    pub new_tickets_sold: u64,
    pub new_pot: U256,
}

/// A winner was drawn; terminal for the lottery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryDrawn {
    pub id: u64,
    pub winner: Address,
    pub payout_winner: U256,
    pub total_profit: U256,
}

/// The lottery expired without a draw; terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotteryExpired {
    pub id: u64,
}

/// A user claimed a withdrawal. Informational only; no cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    pub user: Address,
}

/// A creator withdrew accumulated profit; resets their pending-profit
/// counter, keyed by creator address rather than lottery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitWithdrawn {
    pub creator: Address,
}

/// One observed contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Created(LotteryCreated),
    TicketPurchased(TicketPurchased),
    Drawn(LotteryDrawn),
    Expired(LotteryExpired),
    Withdrawal(Withdrawal),
    ProfitWithdrawn(ProfitWithdrawn),
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::Created(_) => EventKind::LotteryCreated,
            ChainEvent::TicketPurchased(_) => EventKind::TicketPurchased,
            ChainEvent::Drawn(_) => EventKind::LotteryDrawn,
            ChainEvent::Expired(_) => EventKind::LotteryExpired,
            ChainEvent::Withdrawal(_) => EventKind::Withdrawal,
            ChainEvent::ProfitWithdrawn(_) => EventKind::ProfitWithdrawn,
        }
    }

    /// The lottery id this event is scoped to, if any.
    pub fn lottery_id(&self) -> Option<u64> {
        match self {
            ChainEvent::Created(ev) => Some(ev.id),
            ChainEvent::TicketPurchased(ev) => Some(ev.id),
            ChainEvent::Drawn(ev) => Some(ev.id),
            ChainEvent::Expired(ev) => Some(ev.id),
            ChainEvent::Withdrawal(_) | ChainEvent::ProfitWithdrawn(_) => None,
        }
    }
}

/// The six contract event kinds; each gets its own watcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LotteryCreated,
    TicketPurchased,
    LotteryDrawn,
    LotteryExpired,
    Withdrawal,
    ProfitWithdrawn,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::LotteryCreated,
        EventKind::TicketPurchased,
        EventKind::LotteryDrawn,
        EventKind::LotteryExpired,
        EventKind::Withdrawal,
        EventKind::ProfitWithdrawn,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::LotteryCreated => write!(f, "LotteryCreated"),
            EventKind::TicketPurchased => write!(f, "TicketPurchased"),
            EventKind::LotteryDrawn => write!(f, "LotteryDrawn"),
            EventKind::LotteryExpired => write!(f, "LotteryExpired"),
            EventKind::Withdrawal => write!(f, "Withdrawal"),
            EventKind::ProfitWithdrawn => write!(f, "ProfitWithdrawn"),
        }
    }
}
