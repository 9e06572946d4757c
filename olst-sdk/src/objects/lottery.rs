//! Lottery state objects.
//!
//! [`LotterySnapshot`] is the authoritative read shape returned by the
//! contract; [`LotteryView`] is the consumer-facing merged view produced
//! by the reconciling client. The on-chain status lives here as the
//! wire/DTO enum; the projected cache in `olst-core` reuses it directly.

use crate::lifecycle::{LifecyclePhase, derive_phase};
use crate::objects::activity::ActivityNotification;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// On-chain lottery status.
///
/// Advances `Open -> {Drawn | Expired}` and never reverts. The numeric
/// values match the contract's enum encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnChainStatus {
    Open,
    Drawn,
    Expired,
}

impl OnChainStatus {
    /// `Drawn` and `Expired` are terminal; their entity fields are frozen.
    pub fn is_terminal(self) -> bool {
        matches!(self, OnChainStatus::Drawn | OnChainStatus::Expired)
    }

    /// Decode the contract's enum encoding.
    pub fn from_chain(value: u8) -> Option<Self> {
        match value {
            0 => Some(OnChainStatus::Open),
            1 => Some(OnChainStatus::Drawn),
            2 => Some(OnChainStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for OnChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnChainStatus::Open => write!(f, "open"),
            OnChainStatus::Drawn => write!(f, "drawn"),
            OnChainStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Authoritative lottery state as read directly from the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySnapshot {
    pub id: u64,
    pub creator: Address,
    pub ticket_price: U256,
    pub prize_amount: U256,
    /// Absolute unix timestamp (seconds) after which tickets cannot be bought.
    pub buy_deadline: i64,
    pub status: OnChainStatus,
    pub tickets_sold: u64,
    pub pot: U256,
    /// `None` while open; set exactly once when drawn. The contract
    /// stores the zero address for "no winner"; reads normalize that
    /// to `None`.
    pub winner: Option<Address>,
}

/// Where the figures in a view came from.
///
/// Consumers must be able to tell an unconfirmed push-cache view from
/// one backed by an authoritative read before showing financial fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// No authoritative read has ever succeeded; there is nothing safe
    /// to display.
    Unavailable,
    /// Last known state, possibly stale: push updates have arrived since
    /// the last confirmed read, or the last read attempt failed.
    Cached,
    /// The view matches the most recent authoritative read.
    Authoritative,
}

/// The single consumer-facing view of one lottery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryView {
    pub id: u64,
    pub creator: Address,
    pub ticket_price: U256,
    pub prize_amount: U256,
    pub buy_deadline: i64,
    pub tickets_sold: u64,
    pub pot: U256,
    /// Derived from on-chain status and the wall clock at build time.
    pub phase: LifecyclePhase,
    pub status: OnChainStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Address>,
    pub freshness: Freshness,
    /// Bounded, deduplicated, newest-first.
    pub recent_activity: Vec<ActivityNotification>,
}

impl LotteryView {
    /// Build a view from a snapshot, deriving the phase at `now`.
    pub fn from_snapshot(
        snapshot: &LotterySnapshot,
        now: i64,
        freshness: Freshness,
        recent_activity: Vec<ActivityNotification>,
    ) -> Self {
        Self {
            id: snapshot.id,
            creator: snapshot.creator,
            ticket_price: snapshot.ticket_price,
            prize_amount: snapshot.prize_amount,
            buy_deadline: snapshot.buy_deadline,
            tickets_sold: snapshot.tickets_sold,
            pot: snapshot.pot,
            phase: derive_phase(snapshot.status, snapshot.buy_deadline, now),
            status: snapshot.status,
            winner: snapshot.winner,
            freshness,
            recent_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn snapshot() -> LotterySnapshot {
        LotterySnapshot {
            id: 1,
            creator: address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045"),
            ticket_price: U256::from(10u64),
            prize_amount: U256::from(200u64),
            buy_deadline: 1_700_000_600,
            status: OnChainStatus::Open,
            tickets_sold: 3,
            pot: U256::from(230u64),
            winner: None,
        }
    }

    #[test]
    fn status_terminality() {
        assert!(!OnChainStatus::Open.is_terminal());
        assert!(OnChainStatus::Drawn.is_terminal());
        assert!(OnChainStatus::Expired.is_terminal());
    }

    #[test]
    fn chain_enum_decoding() {
        assert_eq!(OnChainStatus::from_chain(0), Some(OnChainStatus::Open));
        assert_eq!(OnChainStatus::from_chain(2), Some(OnChainStatus::Expired));
        assert_eq!(OnChainStatus::from_chain(3), None);
    }

    #[test]
    fn view_phase_follows_clock() {
        let snap = snapshot();
        let active =
            LotteryView::from_snapshot(&snap, snap.buy_deadline - 1, Freshness::Authoritative, vec![]);
        assert_eq!(active.phase, LifecyclePhase::Active);

        let ended =
            LotteryView::from_snapshot(&snap, snap.buy_deadline + 1, Freshness::Authoritative, vec![]);
        assert_eq!(ended.phase, LifecyclePhase::Ended);
        // Display-only inference: the on-chain status is untouched.
        assert_eq!(ended.status, OnChainStatus::Open);
    }
}
