//! The publish store: keyed last-write-wins cache with push subscription.
//!
//! This is the single point of mutation in the pipeline. The projector
//! is the only writer of entity-keyed values; reconciling clients are
//! the readers and subscribers. The store holds the *latest known
//! projected state*, not history: keys are never deleted, a missing key
//! simply means nothing was ever projected for it, and nothing here is
//! authoritative for decisions that move funds.
//!
//! Subscription is per key (tokio broadcast, at-least-once, write order
//! as observed by the store, no ordering across keys) plus one global
//! notification channel. Dropping a receiver is the unsubscribe; a
//! lagged receiver must re-[`read`](PublishStore::read) rather than
//! expect backfill — the store deliberately provides none.

use olst_sdk::keys::StreamKey;
use olst_sdk::objects::activity::ActivityNotification;
use olst_sdk::objects::cache::{CachedLottery, CreatorState};
use std::collections::HashMap;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

/// Broadcast capacity for each per-key channel. Small: one slow entity
/// subscriber lagging out is recovered by a fresh read, not by history.
const KEY_CHANNEL_CAPACITY: usize = 64;

/// Broadcast capacity for the global activity channel.
const GLOBAL_CHANNEL_CAPACITY: usize = 256;

/// A value stored under one key; the variant must match the key's
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValue {
    Lottery(CachedLottery),
    Creator(CreatorState),
}

impl StoreValue {
    fn merge(&mut self, patch: &StoreValue) -> bool {
        match (self, patch) {
            (StoreValue::Lottery(value), StoreValue::Lottery(patch)) => {
                let before = value.clone();
                value.merge(patch);
                *value != before
            }
            (StoreValue::Creator(value), StoreValue::Creator(patch)) => {
                let before = value.clone();
                value.merge(patch);
                *value != before
            }
            _ => false,
        }
    }

    fn matches_key(&self, key: StreamKey) -> bool {
        matches!(
            (self, key),
            (StoreValue::Lottery(_), StreamKey::Entity(_))
                | (StoreValue::Creator(_), StreamKey::Creator(_))
        )
    }
}

/// One delivered write: the merged value after the write, plus the
/// entity-scoped notification attached to it, if any.
#[derive(Debug, Clone)]
pub struct KeyUpdate {
    pub key: StreamKey,
    pub value: StoreValue,
    pub notification: Option<ActivityNotification>,
}

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// At least one field changed; subscribers were notified.
    Applied,
    /// The patch repeated already-current values; nothing was delivered.
    Unchanged,
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The value variant does not belong to the key's namespace.
    /// A projector bug, not a delivery problem; retrying cannot help.
    #[error("value kind does not match key namespace for {key}")]
    KindMismatch { key: StreamKey },

    /// The store (or a remote store backend) could not accept the
    /// write right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether a bounded-backoff retry is worthwhile.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::KindMismatch { .. } => false,
            StoreError::Unavailable(_) => true,
        }
    }
}

/// Write/publish seam between the projector and the store.
///
/// The in-memory [`PublishStore`] is the only production implementation;
/// the trait exists so the projector's retry and ordering logic can be
/// exercised against failing sinks.
#[async_trait::async_trait]
pub trait StateSink: Send + Sync {
    /// Point lookup of the current cached value. Never consults the
    /// event source.
    async fn read(&self, key: StreamKey) -> Option<StoreValue>;

    /// Merge `patch` into the value under `key`, creating the key if
    /// absent, and deliver `notification` with the update when the
    /// write is a genuine change.
    async fn write_with_event(
        &self,
        key: StreamKey,
        patch: StoreValue,
        notification: Option<ActivityNotification>,
    ) -> Result<WriteOutcome, StoreError>;

    /// Append to the global activity channel. Fire-and-forget: the
    /// caller does not wait for (or learn about) delivery.
    fn publish_notification(&self, notification: ActivityNotification);

    /// Plain write without an attached notification.
    async fn write(&self, key: StreamKey, patch: StoreValue) -> Result<WriteOutcome, StoreError> {
        self.write_with_event(key, patch, None).await
    }
}

struct KeyState {
    /// `None` until the first write: subscribing to a key must not
    /// fabricate a value for it.
    value: Option<StoreValue>,
    tx: broadcast::Sender<KeyUpdate>,
}

impl KeyState {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(KEY_CHANNEL_CAPACITY);
        Self { value: None, tx }
    }
}

/// The in-memory publish store.
pub struct PublishStore {
    keys: RwLock<HashMap<StreamKey, KeyState>>,
    global_tx: broadcast::Sender<ActivityNotification>,
}

impl PublishStore {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);
        Self {
            keys: RwLock::new(HashMap::new()),
            global_tx,
        }
    }

    /// Subscribe to writes on one key.
    ///
    /// Registered before any write, the receiver sees every subsequent
    /// write in store order. Dropping the receiver unsubscribes; a
    /// `Lagged` recv error means updates were missed and the consumer
    /// must re-read current state.
    pub async fn subscribe(&self, key: StreamKey) -> broadcast::Receiver<KeyUpdate> {
        let mut keys = self.keys.write().await;
        keys.entry(key).or_insert_with(KeyState::new).tx.subscribe()
    }

    /// Subscribe to the global activity channel.
    pub fn subscribe_global(&self) -> broadcast::Receiver<ActivityNotification> {
        self.global_tx.subscribe()
    }
}

impl Default for PublishStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateSink for PublishStore {
    async fn read(&self, key: StreamKey) -> Option<StoreValue> {
        let keys = self.keys.read().await;
        keys.get(&key).and_then(|state| state.value.clone())
    }

    async fn write_with_event(
        &self,
        key: StreamKey,
        patch: StoreValue,
        notification: Option<ActivityNotification>,
    ) -> Result<WriteOutcome, StoreError> {
        if !patch.matches_key(key) {
            return Err(StoreError::KindMismatch { key });
        }

        let mut keys = self.keys.write().await;
        let state = keys.entry(key).or_insert_with(KeyState::new);

        let changed = match &mut state.value {
            Some(value) => value.merge(&patch),
            None => {
                state.value = Some(patch);
                true
            }
        };

        if !changed {
            debug!(%key, "write repeated current values, skipping delivery");
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(value) = &state.value {
            // A send error only means no subscriber is currently
            // listening, which is fine for a push cache.
            let _ = state.tx.send(KeyUpdate {
                key,
                value: value.clone(),
                notification,
            });
        }

        Ok(WriteOutcome::Applied)
    }

    fn publish_notification(&self, notification: ActivityNotification) {
        let _ = self.global_tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256, address};
    use olst_sdk::objects::activity::ActivityKind;
    use olst_sdk::objects::lottery::OnChainStatus;

    const CREATOR: Address = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");

    fn initial_entry() -> StoreValue {
        StoreValue::Lottery(CachedLottery {
            creator: Some(CREATOR),
            ticket_price: Some(U256::from(10u64)),
            prize_amount: Some(U256::from(200u64)),
            buy_deadline: Some(1_700_000_600),
            status: Some(OnChainStatus::Open),
            tickets_sold: Some(0),
            pot: Some(U256::from(200u64)),
            ..Default::default()
        })
    }

    fn purchase_patch() -> StoreValue {
        StoreValue::Lottery(CachedLottery {
            tickets_sold: Some(3),
            pot: Some(U256::from(230u64)),
            status: Some(OnChainStatus::Open),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn read_of_absent_key_is_none() {
        let store = PublishStore::new();
        assert!(store.read(StreamKey::Entity(1)).await.is_none());
    }

    #[tokio::test]
    async fn partial_write_leaves_untouched_fields() {
        let store = PublishStore::new();
        let key = StreamKey::Entity(1);
        store.write(key, initial_entry()).await.unwrap();
        store.write(key, purchase_patch()).await.unwrap();

        let Some(StoreValue::Lottery(value)) = store.read(key).await else {
            panic!("expected a lottery value");
        };
        assert_eq!(value.tickets_sold, Some(3));
        assert_eq!(value.pot, Some(U256::from(230u64)));
        assert_eq!(value.creator, Some(CREATOR));
        assert_eq!(value.ticket_price, Some(U256::from(10u64)));
        assert_eq!(value.winner, None);
    }

    #[tokio::test]
    async fn repeated_write_is_unchanged_and_silent() {
        let store = PublishStore::new();
        let key = StreamKey::Entity(1);
        store.write(key, initial_entry()).await.unwrap();

        let mut rx = store.subscribe(key).await;
        assert_eq!(
            store.write(key, purchase_patch()).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.write(key, purchase_patch()).await.unwrap(),
            WriteOutcome::Unchanged
        );

        // Exactly one delivery for the two writes.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscriber_sees_writes_in_store_order() {
        let store = PublishStore::new();
        let key = StreamKey::Entity(7);
        let mut rx = store.subscribe(key).await;

        store.write(key, initial_entry()).await.unwrap();
        store.write(key, purchase_patch()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let StoreValue::Lottery(first) = first.value else {
            panic!("expected a lottery value");
        };
        assert_eq!(first.tickets_sold, Some(0));

        let second = rx.recv().await.unwrap();
        let StoreValue::Lottery(second) = second.value else {
            panic!("expected a lottery value");
        };
        assert_eq!(second.tickets_sold, Some(3));
    }

    #[tokio::test]
    async fn namespace_mismatch_is_fatal() {
        let store = PublishStore::new();
        let err = store
            .write(
                StreamKey::Creator(CREATOR),
                StoreValue::Lottery(CachedLottery::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::KindMismatch { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn creator_key_holds_creator_state() {
        let store = PublishStore::new();
        let key = StreamKey::Creator(CREATOR);
        store
            .write(
                key,
                StoreValue::Creator(CreatorState {
                    pending_profit: Some(U256::ZERO),
                }),
            )
            .await
            .unwrap();
        let Some(StoreValue::Creator(state)) = store.read(key).await else {
            panic!("expected creator state");
        };
        assert_eq!(state.pending_profit, Some(U256::ZERO));
    }

    #[tokio::test]
    async fn global_publish_without_subscribers_is_fine() {
        let store = PublishStore::new();
        store.publish_notification(ActivityNotification {
            lottery_id: 1,
            observed_at: 1,
            kind: ActivityKind::LotteryExpired,
        });
    }

    #[tokio::test]
    async fn notification_rides_along_with_the_write() {
        let store = PublishStore::new();
        let key = StreamKey::Entity(9);
        let mut rx = store.subscribe(key).await;

        let notification = ActivityNotification {
            lottery_id: 9,
            observed_at: 123,
            kind: ActivityKind::WinnerAnnounced {
                winner: CREATOR,
                payout_winner: U256::from(230u64),
                creator_profit: U256::from(30u64),
            },
        };
        store
            .write_with_event(key, initial_entry(), Some(notification.clone()))
            .await
            .unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.notification, Some(notification));
    }
}
