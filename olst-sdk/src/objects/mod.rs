pub mod activity;
pub mod cache;
pub mod lottery;
pub mod ws;

pub use activity::{ActivityKind, ActivityNotification};
pub use cache::{CachedLottery, CreatorState};
pub use lottery::{Freshness, LotterySnapshot, LotteryView, OnChainStatus};
