#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod backoff;
pub mod events;
pub mod projector;
pub mod reconciler;
pub mod source;
pub mod store;
pub mod watcher;
