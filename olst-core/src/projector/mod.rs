//! The state projector.
//!
//! Converts one observed chain event into an idempotent partial-state
//! write keyed by entity id, plus at most one global activity
//! notification. All six event kinds route through [`Projector::apply`],
//! so the ordering and idempotency guards live in exactly one place:
//!
//! - Writes are absolute (totals from the event, never increments), so
//!   redelivery of the same event is a no-op detected by value
//!   comparison. A no-op write emits no notification.
//! - A terminal cache entry (`Drawn`/`Expired`) is frozen: a
//!   late-arriving `TicketPurchased` for the same id is silently
//!   rejected, and a terminal write is applied only while the cached
//!   status is still `Open` (or unknown).
//! - A redelivered `LotteryCreated` for an entity that already has
//!   state only fills missing immutable fields; it never resets the
//!   monotonic counters.
//!
//! Store writes are retried with bounded exponential backoff; the error
//! type distinguishes retries-exhausted (recoverable delivery problem,
//! event dropped, operational alert expected upstream) from fatal
//! namespace bugs.

use crate::backoff::retry_delay;
use crate::events::{
    ChainEvent, ChainEventReceiver, LotteryCreated, LotteryDrawn, LotteryExpired, ProfitWithdrawn,
    TicketPurchased, Withdrawal,
};
use crate::store::{StateSink, StoreError, StoreValue, WriteOutcome};
use alloy_primitives::U256;
use olst_sdk::keys::StreamKey;
use olst_sdk::objects::activity::{ActivityKind, ActivityNotification};
use olst_sdk::objects::cache::{CachedLottery, CreatorState};
use olst_sdk::objects::lottery::OnChainStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default bound on store write attempts (initial try + retries).
const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 4;

/// Errors from projecting one event.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// The store rejected the write for a non-retryable reason.
    #[error("fatal store error: {0}")]
    Fatal(#[source] StoreError),

    /// Retryable write failures persisted through the whole backoff
    /// schedule; the event was dropped.
    #[error("store write failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: StoreError,
    },
}

/// What `apply` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    /// A genuine state transition was written and announced.
    Applied,
    /// The write repeated already-current values (redelivered event);
    /// no notification was emitted.
    Duplicate,
    /// Rejected by the ordering guard: the entity is already terminal,
    /// or the event would rewind a terminal transition. A designed
    /// no-op, not an error.
    Stale,
    /// The event carries no cache write (e.g. `Withdrawal`).
    Informational,
}

/// The state projector. Sole writer of entity-keyed store values.
pub struct Projector<S> {
    sink: Arc<S>,
    max_write_attempts: u32,
}

impl<S: StateSink> Projector<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    #[cfg(test)]
    fn with_max_write_attempts(sink: Arc<S>, attempts: u32) -> Self {
        Self {
            sink,
            max_write_attempts: attempts,
        }
    }

    /// Project one observed event into the store.
    pub async fn apply(&self, event: ChainEvent) -> Result<ProjectOutcome, ProjectError> {
        match event {
            ChainEvent::Created(ev) => self.on_lottery_created(ev).await,
            ChainEvent::TicketPurchased(ev) => self.on_ticket_purchased(ev).await,
            ChainEvent::Drawn(ev) => self.on_lottery_drawn(ev).await,
            ChainEvent::Expired(ev) => self.on_lottery_expired(ev).await,
            ChainEvent::Withdrawal(ev) => Ok(self.on_withdrawal(ev)),
            ChainEvent::ProfitWithdrawn(ev) => self.on_profit_withdrawn(ev).await,
        }
    }

    async fn on_lottery_created(&self, ev: LotteryCreated) -> Result<ProjectOutcome, ProjectError> {
        let key = StreamKey::Entity(ev.id);

        // A redelivered creation for an entity that already has state
        // must not reset the counters; only the immutable fields are
        // (re)filled.
        let patch = match self.cached_lottery(key).await {
            Some(_) => CachedLottery {
                creator: Some(ev.creator),
                ticket_price: Some(ev.ticket_price),
                prize_amount: Some(ev.prize_amount),
                buy_deadline: Some(ev.buy_deadline),
                ..Default::default()
            },
            None => CachedLottery {
                creator: Some(ev.creator),
                ticket_price: Some(ev.ticket_price),
                prize_amount: Some(ev.prize_amount),
                buy_deadline: Some(ev.buy_deadline),
                status: Some(OnChainStatus::Open),
                tickets_sold: Some(0),
                // The initial pot is the creator-funded prize.
                pot: Some(ev.prize_amount),
                ..Default::default()
            },
        };

        let outcome = self
            .write_with_retry(key, StoreValue::Lottery(patch), None)
            .await?;

        if outcome == WriteOutcome::Applied {
            info!(id = ev.id, creator = %ev.creator, prize = %ev.prize_amount, "lottery created");
            self.sink.publish_notification(ActivityNotification {
                lottery_id: ev.id,
                observed_at: now_millis(),
                kind: ActivityKind::LotteryCreated {
                    creator: ev.creator,
                    ticket_price: ev.ticket_price,
                    prize_amount: ev.prize_amount,
                    deadline: ev.buy_deadline,
                },
            });
            Ok(ProjectOutcome::Applied)
        } else {
            Ok(ProjectOutcome::Duplicate)
        }
    }

    async fn on_ticket_purchased(
        &self,
        ev: TicketPurchased,
    ) -> Result<ProjectOutcome, ProjectError> {
        let key = StreamKey::Entity(ev.id);

        if self.is_terminal(key).await {
            debug!(id = ev.id, "ticket purchase for terminal lottery dropped");
            return Ok(ProjectOutcome::Stale);
        }

        let patch = CachedLottery {
            tickets_sold: Some(ev.new_tickets_sold),
            pot: Some(ev.new_pot),
            status: Some(OnChainStatus::Open),
            ..Default::default()
        };
        let outcome = self
            .write_with_retry(key, StoreValue::Lottery(patch), None)
            .await?;

        if outcome == WriteOutcome::Applied {
            info!(
                id = ev.id,
                buyer = %ev.buyer,
                tickets_sold = ev.new_tickets_sold,
                pot = %ev.new_pot,
                "ticket purchased"
            );
            self.sink.publish_notification(ActivityNotification {
                lottery_id: ev.id,
                observed_at: now_millis(),
                kind: ActivityKind::TicketPurchased {
                    buyer: ev.buyer,
                    tickets_sold: ev.new_tickets_sold,
                    pot: ev.new_pot,
                },
            });
            Ok(ProjectOutcome::Applied)
        } else {
            Ok(ProjectOutcome::Duplicate)
        }
    }

    async fn on_lottery_drawn(&self, ev: LotteryDrawn) -> Result<ProjectOutcome, ProjectError> {
        let key = StreamKey::Entity(ev.id);

        if self.is_terminal(key).await {
            debug!(id = ev.id, "draw for already-terminal lottery dropped");
            return Ok(ProjectOutcome::Stale);
        }

        let notification = ActivityNotification {
            lottery_id: ev.id,
            observed_at: now_millis(),
            kind: ActivityKind::WinnerAnnounced {
                winner: ev.winner,
                payout_winner: ev.payout_winner,
                creator_profit: ev.total_profit,
            },
        };

        let patch = CachedLottery {
            status: Some(OnChainStatus::Drawn),
            winner: Some(ev.winner),
            creator_profit: Some(ev.total_profit),
            payout_winner: Some(ev.payout_winner),
            ..Default::default()
        };

        // The winner announcement is both entity-scoped (attached to
        // the write) and global.
        let outcome = self
            .write_with_retry(key, StoreValue::Lottery(patch), Some(notification.clone()))
            .await?;

        if outcome == WriteOutcome::Applied {
            info!(id = ev.id, winner = %ev.winner, payout = %ev.payout_winner, "winner drawn");
            self.sink.publish_notification(notification);
            Ok(ProjectOutcome::Applied)
        } else {
            Ok(ProjectOutcome::Duplicate)
        }
    }

    async fn on_lottery_expired(&self, ev: LotteryExpired) -> Result<ProjectOutcome, ProjectError> {
        let key = StreamKey::Entity(ev.id);

        if self.is_terminal(key).await {
            debug!(id = ev.id, "expiry for already-terminal lottery dropped");
            return Ok(ProjectOutcome::Stale);
        }

        let patch = CachedLottery {
            status: Some(OnChainStatus::Expired),
            ..Default::default()
        };
        let outcome = self
            .write_with_retry(key, StoreValue::Lottery(patch), None)
            .await?;

        if outcome == WriteOutcome::Applied {
            info!(id = ev.id, "lottery expired");
            self.sink.publish_notification(ActivityNotification {
                lottery_id: ev.id,
                observed_at: now_millis(),
                kind: ActivityKind::LotteryExpired,
            });
            Ok(ProjectOutcome::Applied)
        } else {
            Ok(ProjectOutcome::Duplicate)
        }
    }

    fn on_withdrawal(&self, ev: Withdrawal) -> ProjectOutcome {
        info!(user = %ev.user, "withdrawal claimed");
        ProjectOutcome::Informational
    }

    async fn on_profit_withdrawn(
        &self,
        ev: ProfitWithdrawn,
    ) -> Result<ProjectOutcome, ProjectError> {
        let key = StreamKey::Creator(ev.creator);
        let patch = CreatorState {
            pending_profit: Some(U256::ZERO),
        };
        let outcome = self
            .write_with_retry(key, StoreValue::Creator(patch), None)
            .await?;

        if outcome == WriteOutcome::Applied {
            info!(creator = %ev.creator, "creator profit withdrawn");
            Ok(ProjectOutcome::Applied)
        } else {
            Ok(ProjectOutcome::Duplicate)
        }
    }

    async fn cached_lottery(&self, key: StreamKey) -> Option<CachedLottery> {
        match self.sink.read(key).await {
            Some(StoreValue::Lottery(value)) => Some(value),
            _ => None,
        }
    }

    /// Ordering guard: true if the cached status has left `Open`.
    /// Unknown (never projected) counts as not terminal.
    async fn is_terminal(&self, key: StreamKey) -> bool {
        self.cached_lottery(key)
            .await
            .and_then(|value| value.status)
            .is_some_and(OnChainStatus::is_terminal)
    }

    async fn write_with_retry(
        &self,
        key: StreamKey,
        patch: StoreValue,
        notification: Option<ActivityNotification>,
    ) -> Result<WriteOutcome, ProjectError> {
        let mut attempt = 0u32;
        loop {
            match self
                .sink
                .write_with_event(key, patch.clone(), notification.clone())
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if !err.is_retryable() => return Err(ProjectError::Fatal(err)),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_write_attempts {
                        return Err(ProjectError::RetriesExhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    warn!(%key, error = %err, attempt, "store write failed, backing off");
                    tokio::time::sleep(retry_delay(attempt - 1)).await;
                }
            }
        }
    }
}

/// Current unix time in milliseconds, the arrival-time ordering key
/// for notifications.
fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Drives the projector from the chain event channel.
pub struct ProjectorRunner<S> {
    projector: Projector<S>,
    event_rx: ChainEventReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: StateSink> ProjectorRunner<S> {
    pub fn new(
        projector: Projector<S>,
        event_rx: ChainEventReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            projector,
            event_rx,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signaled or the event channel closes.
    pub async fn run(mut self) {
        info!("ProjectorRunner started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("ProjectorRunner received shutdown signal");
                        break;
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    let kind = event.kind();
                    let id = event.lottery_id();
                    match self.projector.apply(event).await {
                        Ok(outcome) => {
                            debug!(%kind, ?id, ?outcome, "event projected");
                        }
                        Err(e) => {
                            // Recoverable or not, the event is dropped;
                            // the authoritative read path corrects any
                            // resulting drift.
                            error!(%kind, ?id, error = %e, "failed to project event");
                        }
                    }
                }

                else => {
                    info!("chain event channel closed");
                    break;
                }
            }
        }

        info!("ProjectorRunner shutdown complete");
    }
}
