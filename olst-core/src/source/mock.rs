//! In-memory [`LotterySource`] for tests and local development.

use super::{LotterySource, SourceError};
use async_trait::async_trait;
use olst_sdk::objects::lottery::LotterySnapshot;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MockLotterySource {
    snapshots: Mutex<HashMap<u64, LotterySnapshot>>,
    fail_reads: AtomicU32,
}

impl MockLotterySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the authoritative state for one lottery.
    pub fn set_lottery(&self, snapshot: LotterySnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert(snapshot.id, snapshot);
        }
    }

    /// Make the next `n` reads fail with a retryable error.
    pub fn fail_next(&self, n: u32) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LotterySource for MockLotterySource {
    async fn lottery(&self, id: u64) -> Result<LotterySnapshot, SourceError> {
        if self.take_failure() {
            return Err(SourceError::Timeout(Duration::from_secs(0)));
        }
        self.snapshots
            .lock()
            .map_err(|_| SourceError::Parse("snapshot map poisoned".into()))?
            .get(&id)
            .cloned()
            .ok_or(SourceError::NotFound(id))
    }

    async fn lottery_count(&self) -> Result<u64, SourceError> {
        if self.take_failure() {
            return Err(SourceError::Timeout(Duration::from_secs(0)));
        }
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| SourceError::Parse("snapshot map poisoned".into()))?;
        Ok(snapshots.keys().copied().max().map_or(0, |id| id + 1))
    }
}
