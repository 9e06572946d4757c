//! Chain log polling.
//!
//! One [`LogWatcher`] runs per event kind. Each keeps its own block
//! cursor and only advances it after every decoded event from a poll
//! has been handed to the projector channel, so a failed poll is
//! re-attempted from the same block and duplicates are left for the
//! projector to absorb.

use crate::events::{ChainEventSender, EventKind};
use crate::source::RpcLotterySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct LogWatcher {
    source: Arc<RpcLotterySource>,
    kind: EventKind,
    event_tx: ChainEventSender,
    shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
    cursor: u64,
}

impl LogWatcher {
    pub fn new(
        source: Arc<RpcLotterySource>,
        kind: EventKind,
        event_tx: ChainEventSender,
        shutdown_rx: watch::Receiver<bool>,
        poll_interval: Duration,
        start_block: u64,
    ) -> Self {
        Self {
            source,
            kind,
            event_tx,
            shutdown_rx,
            poll_interval,
            cursor: start_block,
        }
    }

    pub async fn run(mut self) {
        info!(kind = %self.kind, start_block = self.cursor, "log watcher started");
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!(kind = %self.kind, "log watcher shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.poll().await.is_err() {
                        info!(kind = %self.kind, "event channel closed, stopping watcher");
                        break;
                    }
                }
            }
        }
    }

    /// One poll round. Returns `Err(())` only when the projector side
    /// of the channel is gone.
    async fn poll(&mut self) -> Result<(), ()> {
        let logs = match self.source.fetch_logs(self.kind, self.cursor).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(kind = %self.kind, from_block = self.cursor, error = %e, "log fetch failed");
                return Ok(());
            }
        };
        if logs.is_empty() {
            return Ok(());
        }

        debug!(kind = %self.kind, count = logs.len(), from_block = self.cursor, "fetched logs");
        let mut next_cursor = self.cursor;
        for log in &logs {
            let event = match crate::source::rpc::decode_event(self.kind, log) {
                Ok(event) => event,
                Err(e) => {
                    // Malformed payloads are dropped, not retried: the
                    // chain will never return different bytes for the
                    // same log.
                    warn!(
                        kind = %self.kind,
                        block = log.block_number,
                        error = %e,
                        "dropping undecodable log"
                    );
                    next_cursor = next_cursor.max(log.block_number + 1);
                    continue;
                }
            };
            if self.event_tx.send(event).await.is_err() {
                return Err(());
            }
            next_cursor = next_cursor.max(log.block_number + 1);
        }
        self.cursor = next_cursor;
        Ok(())
    }
}
