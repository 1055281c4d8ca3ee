//! Idle-timeout queue: live connections ordered by expiry.

use std::collections::VecDeque;
use std::time::Instant;

use crate::registry::ConnId;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Entry {
    pub expiry: Instant,
    pub conn: ConnId,
}

/// Ascending by expiry, ties in insertion order.
///
/// The single armed timer always targets the head; arming itself is the
/// transport's job, so removing an entry never has to retarget a timer.
#[derive(Debug, Default)]
pub(crate) struct TimeoutQueue {
    entries: VecDeque<Entry>,
}

impl TimeoutQueue {
    pub fn insert(&mut self, conn: ConnId, expiry: Instant) {
        let at = self.entries.partition_point(|e| e.expiry <= expiry);
        self.entries.insert(at, Entry { expiry, conn });
    }

    pub fn remove(&mut self, conn: ConnId) {
        self.entries.retain(|e| e.conn != conn);
    }

    pub fn head(&self) -> Option<Entry> {
        self.entries.front().copied()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn order(&self) -> Vec<ConnId> {
        self.entries.iter().map(|e| e.conn).collect()
    }
}
