//! Stream key namespace.
//!
//! Every value in the publish store lives under a typed key:
//!
//! - `entity:<id>` — the projected cache entry for one lottery
//! - `creator:<address>` — pending-profit state for one creator
//! - `global:activity` — the broadcast notification channel
//!
//! The textual form is what appears on the wire and in logs; in-process
//! code always handles the typed [`StreamKey`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A typed key into the publish store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StreamKey {
    /// Per-lottery projected state, keyed by lottery id.
    Entity(u64),
    /// Per-creator pending-profit state, keyed by creator address.
    Creator(Address),
    /// The reserved global activity channel.
    GlobalActivity,
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKey::Entity(id) => write!(f, "entity:{id}"),
            StreamKey::Creator(addr) => write!(f, "creator:{addr}"),
            StreamKey::GlobalActivity => write!(f, "global:activity"),
        }
    }
}

/// Errors from parsing the textual key form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseKeyError {
    #[error("unknown key namespace: {0}")]
    UnknownNamespace(String),
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
    #[error("invalid creator address: {0}")]
    InvalidAddress(String),
}

impl FromStr for StreamKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global:activity" {
            return Ok(StreamKey::GlobalActivity);
        }
        match s.split_once(':') {
            Some(("entity", id)) => id
                .parse::<u64>()
                .map(StreamKey::Entity)
                .map_err(|_| ParseKeyError::InvalidEntityId(id.to_owned())),
            Some(("creator", addr)) => addr
                .parse::<Address>()
                .map(StreamKey::Creator)
                .map_err(|_| ParseKeyError::InvalidAddress(addr.to_owned())),
            _ => Err(ParseKeyError::UnknownNamespace(s.to_owned())),
        }
    }
}

impl TryFrom<String> for StreamKey {
    type Error = ParseKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamKey> for String {
    fn from(value: StreamKey) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn entity_key_round_trip() {
        let key = StreamKey::Entity(42);
        assert_eq!(key.to_string(), "entity:42");
        assert_eq!("entity:42".parse::<StreamKey>(), Ok(key));
    }

    #[test]
    fn creator_key_round_trip() {
        let addr = address!("d8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
        let key = StreamKey::Creator(addr);
        let parsed: StreamKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn global_key_parses() {
        assert_eq!(
            "global:activity".parse::<StreamKey>(),
            Ok(StreamKey::GlobalActivity)
        );
    }

    #[test]
    fn rejects_unknown_namespace() {
        assert!(matches!(
            "order:7".parse::<StreamKey>(),
            Err(ParseKeyError::UnknownNamespace(_))
        ));
    }

    #[test]
    fn rejects_bad_entity_id() {
        assert!(matches!(
            "entity:-3".parse::<StreamKey>(),
            Err(ParseKeyError::InvalidEntityId(_))
        ));
    }
}
