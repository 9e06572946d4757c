//! WebSocket message types for the relay's streaming endpoints.
//!
//! `GET /lotteries/{id}/ws` upgrades to a WebSocket and pushes
//! [`WsServerMessage`] JSON frames for one entity stream;
//! `GET /activity/ws` does the same for the global activity channel.
//!
//! # Protocol (entity stream)
//!
//! 1. The server sends a [`WsServerMessage::Snapshot`] with the current
//!    projected cache entry immediately after the upgrade.
//! 2. Subsequent [`WsServerMessage::Update`] frames are sent per store
//!    write, in store order, each carrying the merged value and — for
//!    winner announcements — the entity-scoped notification.
//! 3. After a terminal status (`Drawn`, `Expired`) has been delivered
//!    the server sends a normal close frame. The entity itself remains
//!    readable via the point-read endpoint forever.
//! 4. If the entity has never been projected, the server sends an
//!    [`WsServerMessage::Error`] and closes with an application close
//!    code (see [`WsCloseCode`]).
//!
//! Delivery is at-least-once; after a reconnect the snapshot frame is
//! the client's re-seeding point, and duplicate notifications must be
//! deduplicated by the consumer.

use serde::{Deserialize, Serialize};

use super::activity::ActivityNotification;
use super::cache::CachedLottery;

/// Server-to-client WebSocket message.
///
/// Internally tagged so the client can dispatch on the `"type"` field:
///
/// ```json
/// {"type":"snapshot","lottery_id":1,"state":{ ... }}
/// {"type":"error","code":4004,"reason":"lottery not found"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Current cache entry, sent as the first frame of an entity stream.
    Snapshot {
        lottery_id: u64,
        state: CachedLottery,
    },

    /// A store write for the subscribed entity. `state` is the merged
    /// value after the write, not the partial patch.
    Update {
        lottery_id: u64,
        state: CachedLottery,
        /// Entity-scoped notification attached to this write, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        notification: Option<ActivityNotification>,
    },

    /// A frame on the global activity stream.
    Activity { notification: ActivityNotification },

    /// A server-side error; the server may send a close frame next.
    Error { code: u16, reason: String },
}

/// Well-known WebSocket close codes used by the relay.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// Normal closure after a terminal status has been delivered.
    pub const NORMAL: u16 = 1000;

    /// An unexpected server-side error prevented the connection from
    /// continuing.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// The requested lottery has never been projected.
    pub const LOTTERY_NOT_FOUND: u16 = 4004;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_internally_tagged() {
        let msg = WsServerMessage::Error {
            code: WsCloseCode::LOTTERY_NOT_FOUND,
            reason: "lottery not found".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], 4004);
    }

    #[test]
    fn update_without_notification_omits_the_field() {
        let msg = WsServerMessage::Update {
            lottery_id: 3,
            state: CachedLottery::default(),
            notification: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("notification"));
    }
}
