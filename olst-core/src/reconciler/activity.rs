//! Bounded, newest-first activity rings.

use olst_sdk::objects::ActivityNotification;
use std::collections::VecDeque;

/// Per-lottery feed depth.
pub const ENTITY_ACTIVITY_CAPACITY: usize = 10;
/// Site-wide feed depth.
pub const GLOBAL_ACTIVITY_CAPACITY: usize = 50;

/// Fixed-capacity notification ring, newest first.
///
/// Redeliveries are absorbed here: a notification whose dedup key is
/// already present is a no-op.
#[derive(Debug)]
pub struct ActivityBuffer {
    capacity: usize,
    entries: VecDeque<ActivityNotification>,
}

impl ActivityBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` if the notification was new and retained.
    pub fn push(&mut self, notification: ActivityNotification) -> bool {
        let key = notification.dedup_key();
        if self.entries.iter().any(|n| n.dedup_key() == key) {
            return false;
        }
        self.entries.push_front(notification);
        self.entries.truncate(self.capacity);
        true
    }

    pub fn snapshot(&self) -> Vec<ActivityNotification> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
