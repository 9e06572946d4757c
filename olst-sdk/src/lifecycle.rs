//! Lifecycle phase derivation.
//!
//! The effective phase of a lottery depends on both the on-chain status
//! enum and the wall clock: an `Open` lottery whose buy deadline has
//! passed is displayed as ended even though no draw/expire transaction
//! has finalized it yet. That deadline-only inference is display-level;
//! payout logic must keep relying on [`OnChainStatus`].

use crate::objects::lottery::OnChainStatus;
use serde::{Deserialize, Serialize};

/// The consumer-facing lifecycle phase of a lottery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// Open on-chain and the buy deadline has not passed.
    Active,
    /// Drawn, expired, or open with the deadline passed.
    Ended,
}

/// Derive the lifecycle phase from on-chain status and the buy deadline.
///
/// Pure and deterministic; because `now` moves independently of any
/// event, callers must re-evaluate this on every render or poll tick
/// rather than caching the result.
pub fn derive_phase(status: OnChainStatus, buy_deadline: i64, now: i64) -> LifecyclePhase {
    if status == OnChainStatus::Open && now <= buy_deadline {
        LifecyclePhase::Active
    } else {
        LifecyclePhase::Ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: i64 = 1_700_000_000;

    #[test]
    fn open_before_deadline_is_active() {
        assert_eq!(
            derive_phase(OnChainStatus::Open, DEADLINE, DEADLINE - 1),
            LifecyclePhase::Active
        );
    }

    #[test]
    fn deadline_instant_is_still_active() {
        assert_eq!(
            derive_phase(OnChainStatus::Open, DEADLINE, DEADLINE),
            LifecyclePhase::Active
        );
    }

    #[test]
    fn open_after_deadline_is_ended() {
        assert_eq!(
            derive_phase(OnChainStatus::Open, DEADLINE, DEADLINE + 1),
            LifecyclePhase::Ended
        );
    }

    #[test]
    fn drawn_is_ended_even_before_deadline() {
        assert_eq!(
            derive_phase(OnChainStatus::Drawn, DEADLINE, DEADLINE - 1000),
            LifecyclePhase::Ended
        );
    }

    #[test]
    fn expired_is_ended() {
        assert_eq!(
            derive_phase(OnChainStatus::Expired, DEADLINE, DEADLINE - 1),
            LifecyclePhase::Ended
        );
    }
}
