//! The reconciling client: merges authoritative reads with push updates.
//!
//! Each subscribed lottery gets its own task. The task registers on the
//! publish store key *before* the seeding read so no write can fall in
//! the gap, then serves a single merged [`ViewSnapshot`] through a watch
//! channel. Push updates give low latency, authoritative re-reads after
//! every observed transition give convergence, and the freshness marker
//! tells consumers which of the two they are looking at.

pub mod activity;

use crate::backoff::{retry_delay, with_jitter};
use crate::source::{LotterySource, SourceError};
use crate::store::{KeyUpdate, PublishStore, StoreValue};
use activity::{ActivityBuffer, ENTITY_ACTIVITY_CAPACITY, GLOBAL_ACTIVITY_CAPACITY};
use olst_sdk::keys::StreamKey;
use olst_sdk::objects::{ActivityNotification, CachedLottery, Freshness, LotterySnapshot, LotteryView};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Ceiling on a single authoritative read.
    pub read_timeout: Duration,
    /// Attempts per read before giving up and serving cached state.
    pub max_read_attempts: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(10),
            max_read_attempts: 3,
        }
    }
}

/// What a subscriber currently sees for one lottery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// Whether the push subscription is currently healthy.
    pub connected: bool,
    pub freshness: Freshness,
    /// `None` exactly when freshness is [`Freshness::Unavailable`].
    pub view: Option<LotteryView>,
}

impl ViewSnapshot {
    fn unavailable() -> Self {
        Self {
            connected: false,
            freshness: Freshness::Unavailable,
            view: None,
        }
    }
}

/// Handle to one per-lottery reconciliation task.
///
/// Dropping the handle stops the task; that is the unsubscribe.
pub struct LotterySubscription {
    rx: watch::Receiver<ViewSnapshot>,
    shutdown_tx: watch::Sender<bool>,
}

impl LotterySubscription {
    pub fn current(&self) -> ViewSnapshot {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewSnapshot> {
        self.rx.clone()
    }
}

impl Drop for LotterySubscription {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Handle to the site-wide activity feed task.
pub struct GlobalActivitySubscription {
    rx: watch::Receiver<Vec<ActivityNotification>>,
    shutdown_tx: watch::Sender<bool>,
}

impl GlobalActivitySubscription {
    pub fn current(&self) -> Vec<ActivityNotification> {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<ActivityNotification>> {
        self.rx.clone()
    }
}

impl Drop for GlobalActivitySubscription {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct ReconcilingClient<S: LotterySource + 'static> {
    store: Arc<PublishStore>,
    source: Arc<S>,
    config: ReconcilerConfig,
}

impl<S: LotterySource + 'static> ReconcilingClient<S> {
    pub fn new(store: Arc<PublishStore>, source: Arc<S>, config: ReconcilerConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Start a per-lottery reconciliation task and return its handle.
    pub fn subscribe_lottery(&self, id: u64) -> LotterySubscription {
        let (view_tx, rx) = watch::channel(ViewSnapshot::unavailable());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = EntityTask {
            id,
            store: Arc::clone(&self.store),
            source: Arc::clone(&self.source),
            config: self.config.clone(),
            view_tx,
            shutdown_rx,
            snapshot: None,
            freshness: Freshness::Unavailable,
            connected: false,
            activity: ActivityBuffer::new(ENTITY_ACTIVITY_CAPACITY),
        };
        tokio::spawn(task.run());
        LotterySubscription { rx, shutdown_tx }
    }

    /// Start the site-wide activity feed task and return its handle.
    pub fn subscribe_global_activity(&self) -> GlobalActivitySubscription {
        let (feed_tx, rx) = watch::channel(Vec::new());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut notifications = self.store.subscribe_global();
        tokio::spawn(async move {
            let mut buffer = ActivityBuffer::new(GLOBAL_ACTIVITY_CAPACITY);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    notification = notifications.recv() => match notification {
                        Ok(notification) => {
                            if buffer.push(notification) && feed_tx.send(buffer.snapshot()).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // The ring dedups whatever the channel still
                            // holds; older entries are simply lost.
                            warn!(skipped, "global activity subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        GlobalActivitySubscription { rx, shutdown_tx }
    }
}

/// Outcome of one bounded-retry authoritative read.
enum ReadResult {
    Snapshot(LotterySnapshot),
    Failed,
    Shutdown,
}

struct EntityTask<S: LotterySource> {
    id: u64,
    store: Arc<PublishStore>,
    source: Arc<S>,
    config: ReconcilerConfig,
    view_tx: watch::Sender<ViewSnapshot>,
    shutdown_rx: watch::Receiver<bool>,
    snapshot: Option<LotterySnapshot>,
    freshness: Freshness,
    connected: bool,
    activity: ActivityBuffer,
}

impl<S: LotterySource> EntityTask<S> {
    async fn run(mut self) {
        // Subscribe before the seeding read so a write landing between
        // the two is delivered rather than lost.
        let mut updates = self.store.subscribe(StreamKey::Entity(self.id)).await;

        match self.read_authoritative().await {
            ReadResult::Snapshot(snapshot) => {
                self.snapshot = Some(snapshot);
                self.freshness = Freshness::Authoritative;
                self.connected = true;
            }
            ReadResult::Failed => {
                info!(id = self.id, "seed read failed, serving unavailable");
            }
            ReadResult::Shutdown => return,
        }
        self.publish();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                update = updates.recv() => match update {
                    Ok(update) => {
                        let transition = self.apply_push(update);
                        self.publish();
                        if transition && self.refresh().await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(id = self.id, skipped, "push subscription lagged, re-reading");
                        self.connected = false;
                        self.publish();
                        if self.refresh().await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    fn publish(&self) {
        let view = self.snapshot.as_ref().map(|snapshot| {
            LotteryView::from_snapshot(snapshot, now_secs(), self.freshness, self.activity.snapshot())
        });
        let _ = self.view_tx.send(ViewSnapshot {
            connected: self.connected,
            freshness: self.freshness,
            view,
        });
    }

    /// Fold one delivered write into the local snapshot. Returns whether
    /// it revealed a transition worth confirming with a fresh read.
    fn apply_push(&mut self, update: KeyUpdate) -> bool {
        let StoreValue::Lottery(cache) = update.value else {
            return false;
        };
        if let Some(notification) = update.notification {
            self.activity.push(notification);
        }

        match &mut self.snapshot {
            Some(snapshot) => {
                let was_terminal = snapshot.status.is_terminal();
                let mut changed = false;
                let mut transition = false;

                if let Some(status) = cache.status {
                    // Terminal states never rewind, whatever a late or
                    // reordered push claims.
                    if !was_terminal && snapshot.status != status {
                        snapshot.status = status;
                        changed = true;
                        transition = true;
                    }
                }
                if !was_terminal {
                    if let Some(tickets_sold) = cache.tickets_sold {
                        if tickets_sold > snapshot.tickets_sold {
                            snapshot.tickets_sold = tickets_sold;
                            changed = true;
                            transition = true;
                        }
                    }
                    if let Some(pot) = cache.pot {
                        if pot != snapshot.pot {
                            snapshot.pot = pot;
                            changed = true;
                        }
                    }
                }
                if snapshot.winner.is_none() && cache.winner.is_some() {
                    snapshot.winner = cache.winner;
                    changed = true;
                    transition = true;
                }

                // A push that repeats what the snapshot already holds
                // (e.g. the store write landing after a re-read already
                // installed the same state) must not demote a confirmed
                // view to Cached.
                if changed {
                    self.freshness = Freshness::Cached;
                }
                transition
            }
            None => {
                // No authoritative baseline yet. A creation push carries
                // the full initial state; anything sparser just prompts
                // another read attempt.
                if let Some(snapshot) = snapshot_from_cache(self.id, &cache) {
                    self.snapshot = Some(snapshot);
                    self.freshness = Freshness::Cached;
                }
                true
            }
        }
    }

    /// Confirm cached state with a fresh authoritative read. Returns
    /// `true` when shutdown was requested mid-read.
    async fn refresh(&mut self) -> bool {
        match self.read_authoritative().await {
            ReadResult::Snapshot(fresh) => {
                let keep_terminal = self
                    .snapshot
                    .as_ref()
                    .is_some_and(|s| s.status.is_terminal() && !fresh.status.is_terminal());
                if keep_terminal {
                    // The push claims a terminal state the source has
                    // not confirmed yet. Keep serving it, but never as
                    // confirmed: the read and the snapshot disagree.
                    debug!(id = self.id, "source still open, keeping unconfirmed terminal view");
                    self.freshness = Freshness::Cached;
                } else {
                    debug!(id = self.id, "authoritative re-read converged");
                    self.snapshot = Some(fresh);
                    self.freshness = Freshness::Authoritative;
                }
                self.connected = true;
                self.publish();
                false
            }
            ReadResult::Failed => {
                // Keep serving whatever we have, marked as such.
                if self.snapshot.is_some() {
                    self.freshness = Freshness::Cached;
                }
                self.connected = false;
                self.publish();
                false
            }
            ReadResult::Shutdown => true,
        }
    }

    async fn read_authoritative(&mut self) -> ReadResult {
        let mut attempt = 0;
        loop {
            let read = tokio::time::timeout(self.config.read_timeout, self.source.lottery(self.id));
            let outcome = match read.await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceError::Timeout(self.config.read_timeout)),
            };
            match outcome {
                Ok(snapshot) => return ReadResult::Snapshot(snapshot),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_read_attempts => {
                    let delay = with_jitter(retry_delay(attempt));
                    warn!(id = self.id, attempt, error = %e, delay_ms = delay.as_millis() as u64, "read failed, retrying");
                    attempt += 1;
                    tokio::select! {
                        biased;

                        _ = self.shutdown_rx.changed() => {
                            if *self.shutdown_rx.borrow() {
                                return ReadResult::Shutdown;
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(id = self.id, error = %e, "authoritative read gave up");
                    return ReadResult::Failed;
                }
            }
        }
    }
}

fn snapshot_from_cache(id: u64, cache: &CachedLottery) -> Option<LotterySnapshot> {
    Some(LotterySnapshot {
        id,
        creator: cache.creator?,
        ticket_price: cache.ticket_price?,
        prize_amount: cache.prize_amount?,
        buy_deadline: cache.buy_deadline?,
        status: cache.status?,
        tickets_sold: cache.tickets_sold?,
        pot: cache.pot?,
        winner: cache.winner,
    })
}

fn now_secs() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
