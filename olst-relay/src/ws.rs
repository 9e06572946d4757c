use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use olst_core::source::{LotterySource, SourceError};
use olst_core::store::{PublishStore, StateSink, StoreValue};
use olst_sdk::keys::StreamKey;
use olst_sdk::objects::cache::CachedLottery;
use olst_sdk::objects::lottery::LotterySnapshot;
use olst_sdk::objects::ws::{WsCloseCode, WsServerMessage};

use crate::state::AppState;

/// `GET /lotteries/{id}/ws` — WebSocket lottery state stream.
///
/// Upgrades the HTTP connection to a WebSocket and pushes
/// [`WsServerMessage`] JSON frames whenever the projected state
/// changes. The first frame is always a snapshot of the current state;
/// the connection is closed after a terminal status (`Drawn`,
/// `Expired`) has been delivered.
pub(crate) async fn lottery_ws(
    state: State<AppState>,
    Path(id): Path<u64>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_lottery_ws(socket, app_state, id))
}

/// `GET /activity/ws` — WebSocket site-wide activity stream.
pub(crate) async fn activity_ws(state: State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let app_state = state.0.clone();
    ws.on_upgrade(move |socket| handle_activity_ws(socket, app_state))
}

fn is_terminal(cache: &CachedLottery) -> bool {
    cache.status.is_some_and(|status| status.is_terminal())
}

fn cache_from_snapshot(snapshot: &LotterySnapshot) -> CachedLottery {
    CachedLottery {
        creator: Some(snapshot.creator),
        ticket_price: Some(snapshot.ticket_price),
        prize_amount: Some(snapshot.prize_amount),
        buy_deadline: Some(snapshot.buy_deadline),
        status: Some(snapshot.status),
        tickets_sold: Some(snapshot.tickets_sold),
        pot: Some(snapshot.pot),
        winner: snapshot.winner,
        ..Default::default()
    }
}

async fn send_error_and_close(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = send_json(
        socket,
        &WsServerMessage::Error {
            code,
            reason: reason.into(),
        },
    )
    .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

/// Resolve the entity's current state without touching the store's key
/// map: a cache read first, then an authoritative read for entities
/// that have never been projected. `Ok(None)` means the id is unknown
/// to both the cache and the chain.
async fn lookup_lottery<S: LotterySource>(
    store: &PublishStore,
    source: &S,
    id: u64,
) -> Result<Option<CachedLottery>, SourceError> {
    match store.read(StreamKey::Entity(id)).await {
        Some(StoreValue::Lottery(cache)) => Ok(Some(cache)),
        Some(_) => Ok(None),
        None => match source.lottery(id).await {
            Ok(snapshot) => Ok(Some(cache_from_snapshot(&snapshot))),
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
    }
}

/// Background task that drives a single entity-stream connection.
///
/// 1. Resolves the entity (cache read, falling back to an authoritative
///    read when it has never been projected); an unknown id is rejected
///    here, before any store subscription exists, so arbitrary requests
///    cannot grow the store's key map.
/// 2. Subscribes to the store key, re-reads, and sends the current
///    state as the first message.
/// 3. If already terminal, closes after that first frame.
/// 4. Otherwise forwards store writes for this lottery until a terminal
///    state is delivered or the client disconnects.
async fn handle_lottery_ws(mut socket: WebSocket, state: AppState, id: u64) {
    let key = StreamKey::Entity(id);

    let current = match lookup_lottery(state.store.as_ref(), state.source.as_ref(), id).await {
        Ok(Some(cache)) => cache,
        Ok(None) => {
            send_error_and_close(
                &mut socket,
                WsCloseCode::LOTTERY_NOT_FOUND,
                "lottery not found",
            )
            .await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, id, "WS: failed to read lottery");
            send_error_and_close(&mut socket, WsCloseCode::INTERNAL_ERROR, "internal error").await;
            return;
        }
    };

    let mut updates = state.store.subscribe(key).await;

    // The store may have advanced between the lookup and the
    // subscription; prefer its value for the seed frame. Keys are never
    // deleted, so a lookup hit cannot turn into a miss here.
    let current = match state.store.read(key).await {
        Some(StoreValue::Lottery(cache)) => cache,
        _ => current,
    };

    let terminal = is_terminal(&current);
    let msg = WsServerMessage::Snapshot {
        lottery_id: id,
        state: current,
    };
    if send_json(&mut socket, &msg).await.is_err() {
        return;
    }

    // If already terminal, close after the first message
    if terminal {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: WsCloseCode::NORMAL,
                reason: "".into(),
            })))
            .await;
        return;
    }

    loop {
        tokio::select! {
            result = updates.recv() => {
                match result {
                    Ok(update) => {
                        let StoreValue::Lottery(cache) = update.value else {
                            continue;
                        };
                        let terminal = is_terminal(&cache);
                        let msg = WsServerMessage::Update {
                            lottery_id: id,
                            state: cache,
                            notification: update.notification,
                        };
                        if send_json(&mut socket, &msg).await.is_err() {
                            return;
                        }
                        if terminal {
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: WsCloseCode::NORMAL,
                                    reason: "".into(),
                                })))
                                .await;
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            id,
                            skipped = n,
                            "WS: subscriber lagged, re-sending current state"
                        );
                        let Some(StoreValue::Lottery(cache)) = state.store.read(key).await else {
                            break;
                        };
                        let terminal = is_terminal(&cache);
                        let msg = WsServerMessage::Snapshot {
                            lottery_id: id,
                            state: cache,
                        };
                        if send_json(&mut socket, &msg).await.is_err() {
                            return;
                        }
                        if terminal {
                            let _ = socket
                                .send(Message::Close(Some(CloseFrame {
                                    code: WsCloseCode::NORMAL,
                                    reason: "".into(),
                                })))
                                .await;
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    Some(Ok(_)) => {
                    }
                    Some(Err(_)) => {
                        return;
                    }
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Background task that drives a single global-activity connection.
///
/// Forwards every notification on the global channel until the client
/// disconnects. There is no seed frame; the feed is append-only from
/// the moment of connection.
async fn handle_activity_ws(mut socket: WebSocket, state: AppState) {
    let mut notifications = state.store.subscribe_global();

    loop {
        tokio::select! {
            result = notifications.recv() => {
                match result {
                    Ok(notification) => {
                        let msg = WsServerMessage::Activity { notification };
                        if send_json(&mut socket, &msg).await.is_err() {
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "WS: activity subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        return;
                    }
                    Some(Ok(_)) => {
                    }
                    Some(Err(_)) => {
                        return;
                    }
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
