//! Full pipeline flow: chain events through the projector into the
//! publish store, observed by a reconciling client.

use alloy_primitives::{Address, U256};
use olst_core::events::{
    ChainEvent, LotteryCreated, LotteryDrawn, LotteryExpired, TicketPurchased,
};
use olst_core::projector::{ProjectOutcome, Projector};
use olst_core::reconciler::{ReconcilerConfig, ReconcilingClient, ViewSnapshot};
use olst_core::source::mock::MockLotterySource;
use olst_core::store::{PublishStore, StateSink, StoreValue};
use olst_sdk::keys::StreamKey;
use olst_sdk::lifecycle::LifecyclePhase;
use olst_sdk::objects::lottery::{Freshness, LotterySnapshot, OnChainStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const CREATOR: Address = Address::repeat_byte(0x11);
const BUYER: Address = Address::repeat_byte(0x22);
const WINNER: Address = Address::repeat_byte(0xab);

fn created(id: u64, deadline: i64) -> ChainEvent {
    ChainEvent::Created(LotteryCreated {
        id,
        creator: CREATOR,
        ticket_price: U256::from(10u64),
        prize_amount: U256::from(200u64),
        buy_deadline: deadline,
    })
}

fn purchased(id: u64, tickets: u64, pot: u64) -> ChainEvent {
    ChainEvent::TicketPurchased(TicketPurchased {
        id,
        buyer: BUYER,
        new_tickets_sold: tickets,
        new_pot: U256::from(pot),
    })
}

fn drawn(id: u64) -> ChainEvent {
    ChainEvent::Drawn(LotteryDrawn {
        id,
        winner: WINNER,
        payout_winner: U256::from(230u64),
        total_profit: U256::from(30u64),
    })
}

async fn wait_for<F>(rx: &mut watch::Receiver<ViewSnapshot>, mut predicate: F) -> ViewSnapshot
where
    F: FnMut(&ViewSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("view channel closed");
        }
    })
    .await
    .expect("condition not reached")
}

fn now_secs() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[tokio::test]
async fn lifecycle_projects_through_the_store() {
    let store = Arc::new(PublishStore::new());
    let projector = Projector::new(Arc::clone(&store));
    let deadline = now_secs() + 3600;

    assert_eq!(
        projector.apply(created(1, deadline)).await.expect("create"),
        ProjectOutcome::Applied
    );
    let cache = match store.read(StreamKey::Entity(1)).await {
        Some(StoreValue::Lottery(cache)) => cache,
        other => panic!("expected cached lottery, got {other:?}"),
    };
    assert_eq!(cache.tickets_sold, Some(0));
    assert_eq!(cache.pot, Some(U256::from(200u64)));
    assert_eq!(cache.status, Some(OnChainStatus::Open));

    projector
        .apply(purchased(1, 3, 230))
        .await
        .expect("purchase");
    let cache = match store.read(StreamKey::Entity(1)).await {
        Some(StoreValue::Lottery(cache)) => cache,
        other => panic!("expected cached lottery, got {other:?}"),
    };
    assert_eq!(cache.tickets_sold, Some(3));
    assert_eq!(cache.pot, Some(U256::from(230u64)));

    projector.apply(drawn(1)).await.expect("draw");
    let cache = match store.read(StreamKey::Entity(1)).await {
        Some(StoreValue::Lottery(cache)) => cache,
        other => panic!("expected cached lottery, got {other:?}"),
    };
    assert_eq!(cache.status, Some(OnChainStatus::Drawn));
    assert_eq!(cache.winner, Some(WINNER));
    assert_eq!(cache.payout_winner, Some(U256::from(230u64)));

    // A purchase redelivered after the draw must not disturb the
    // terminal figures.
    assert_eq!(
        projector
            .apply(purchased(1, 4, 240))
            .await
            .expect("stale purchase"),
        ProjectOutcome::Stale
    );
    let cache = match store.read(StreamKey::Entity(1)).await {
        Some(StoreValue::Lottery(cache)) => cache,
        other => panic!("expected cached lottery, got {other:?}"),
    };
    assert_eq!(cache.tickets_sold, Some(3));
    assert_eq!(cache.pot, Some(U256::from(230u64)));
    assert_eq!(cache.status, Some(OnChainStatus::Drawn));
}

#[tokio::test]
async fn redelivered_event_is_a_silent_duplicate() {
    let store = Arc::new(PublishStore::new());
    let projector = Projector::new(Arc::clone(&store));
    let deadline = now_secs() + 3600;
    let mut global = store.subscribe_global();

    projector.apply(created(1, deadline)).await.expect("create");
    projector
        .apply(purchased(1, 3, 230))
        .await
        .expect("purchase");
    assert_eq!(
        projector
            .apply(purchased(1, 3, 230))
            .await
            .expect("redelivery"),
        ProjectOutcome::Duplicate
    );

    // Exactly two notifications made it to the global feed, so the
    // duplicate produced neither a write nor an announcement.
    assert!(global.try_recv().is_ok());
    assert!(global.try_recv().is_ok());
    assert!(global.try_recv().is_err());
}

#[tokio::test]
async fn client_converges_after_missed_updates() {
    let store = Arc::new(PublishStore::new());
    let projector = Projector::new(Arc::clone(&store));
    let source = Arc::new(MockLotterySource::new());
    let deadline = now_secs() + 3600;

    let base = LotterySnapshot {
        id: 1,
        creator: CREATOR,
        ticket_price: U256::from(10u64),
        prize_amount: U256::from(200u64),
        buy_deadline: deadline,
        status: OnChainStatus::Open,
        tickets_sold: 0,
        pot: U256::from(200u64),
        winner: None,
    };
    source.set_lottery(base.clone());

    let client = ReconcilingClient::new(
        Arc::clone(&store),
        Arc::clone(&source),
        ReconcilerConfig::default(),
    );
    let subscription = client.subscribe_lottery(1);
    let mut rx = subscription.watch();
    let view = wait_for(&mut rx, |v| v.freshness == Freshness::Authoritative).await;
    assert_eq!(
        view.view.expect("seeded view").phase,
        LifecyclePhase::Active
    );

    // The chain moves on; the source reflects it before the push lands,
    // as a real node would.
    let mut settled = base;
    settled.status = OnChainStatus::Drawn;
    settled.tickets_sold = 3;
    settled.pot = U256::from(230u64);
    settled.winner = Some(WINNER);
    source.set_lottery(settled);

    projector.apply(created(1, deadline)).await.expect("create");
    projector
        .apply(purchased(1, 3, 230))
        .await
        .expect("purchase");
    projector.apply(drawn(1)).await.expect("draw");

    let view = wait_for(&mut rx, |v| {
        v.freshness == Freshness::Authoritative
            && v.view
                .as_ref()
                .is_some_and(|l| l.status == OnChainStatus::Drawn)
    })
    .await;
    let lottery = view.view.expect("converged view");
    assert_eq!(lottery.winner, Some(WINNER));
    assert_eq!(lottery.tickets_sold, 3);
    assert_eq!(lottery.pot, U256::from(230u64));
    assert_eq!(lottery.phase, LifecyclePhase::Ended);
}

#[tokio::test]
async fn expiry_freezes_and_announces() {
    let store = Arc::new(PublishStore::new());
    let projector = Projector::new(Arc::clone(&store));
    let deadline = now_secs() - 60;
    let mut global = store.subscribe_global();

    projector.apply(created(1, deadline)).await.expect("create");
    projector
        .apply(ChainEvent::Expired(LotteryExpired { id: 1 }))
        .await
        .expect("expire");

    let cache = match store.read(StreamKey::Entity(1)).await {
        Some(StoreValue::Lottery(cache)) => cache,
        other => panic!("expected cached lottery, got {other:?}"),
    };
    assert_eq!(cache.status, Some(OnChainStatus::Expired));

    // Creation and expiry both announce globally.
    let first = global.try_recv().expect("creation notification");
    assert_eq!(first.lottery_id, 1);
    let second = global.try_recv().expect("expiry notification");
    assert_eq!(second.lottery_id, 1);
    assert_eq!(second.kind.name(), "lottery_expired");
}
