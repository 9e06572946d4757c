//! Projected cache entry types.
//!
//! These are the field-sparse values held by the publish store. Every
//! field is optional: an absent field means "unchanged", never "null
//! out", so the same type serves as both the stored value and the
//! partial write applied to it. The cache is advisory — it may be stale
//! or missing entirely and must never be treated as authoritative for
//! decisions that move funds.

use crate::objects::lottery::OnChainStatus;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Projected per-lottery state under an `entity:<id>` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLottery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_price: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prize_amount: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_deadline: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OnChainStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickets_sold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pot: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_profit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_winner: Option<U256>,
}

impl CachedLottery {
    /// Field-level last-write-wins merge: fields present in `patch`
    /// replace the current value, absent fields are left untouched.
    pub fn merge(&mut self, patch: &CachedLottery) {
        macro_rules! take {
            ($field:ident) => {
                if patch.$field.is_some() {
                    self.$field = patch.$field;
                }
            };
        }
        take!(creator);
        take!(ticket_price);
        take!(prize_amount);
        take!(buy_deadline);
        take!(status);
        take!(tickets_sold);
        take!(pot);
        take!(winner);
        take!(creator_profit);
        take!(payout_winner);
    }
}

/// Projected per-creator state under a `creator:<address>` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorState {
    /// Profit set aside for the creator, reset to zero on withdrawal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_profit: Option<U256>,
}

impl CreatorState {
    /// Same merge discipline as [`CachedLottery::merge`].
    pub fn merge(&mut self, patch: &CreatorState) {
        if patch.pending_profit.is_some() {
            self.pending_profit = patch.pending_profit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn merge_leaves_absent_fields_untouched() {
        let creator = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        let mut value = CachedLottery {
            creator: Some(creator),
            ticket_price: Some(U256::from(10u64)),
            tickets_sold: Some(0),
            pot: Some(U256::from(200u64)),
            status: Some(OnChainStatus::Open),
            ..Default::default()
        };

        value.merge(&CachedLottery {
            tickets_sold: Some(3),
            pot: Some(U256::from(230u64)),
            ..Default::default()
        });

        assert_eq!(value.tickets_sold, Some(3));
        assert_eq!(value.pot, Some(U256::from(230u64)));
        assert_eq!(value.creator, Some(creator));
        assert_eq!(value.ticket_price, Some(U256::from(10u64)));
        assert_eq!(value.winner, None);
    }

    #[test]
    fn merge_is_idempotent() {
        let patch = CachedLottery {
            tickets_sold: Some(7),
            pot: Some(U256::from(270u64)),
            ..Default::default()
        };
        let mut once = CachedLottery::default();
        once.merge(&patch);
        let mut twice = once.clone();
        twice.merge(&patch);
        assert_eq!(once, twice);
    }

    #[test]
    fn sparse_fields_stay_off_the_wire() {
        let value = CachedLottery {
            status: Some(OnChainStatus::Expired),
            ..Default::default()
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"status": "expired"}));
    }
}
