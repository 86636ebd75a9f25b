//! Best-effort event replay for clients that missed updates during a brief
//! disconnect. Additive, not a substitute: the authoritative re-convergence
//! path remains a full reload from the long-term store; this only shortens
//! the common case of a sub-second drop.

use crate::message::Envelope;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub struct StoredUpdate {
    pub envelope: Envelope,
    pub sequence: u64,
}

/// A bounded ring buffer of the last `capacity` broadcast updates for one
/// `(workspaceId, systemId)` pair.
pub struct ReplayBuffer {
    capacity: usize,
    history: parking_lot::Mutex<VecDeque<StoredUpdate>>,
    sequence: AtomicU64,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, history: parking_lot::Mutex::new(VecDeque::with_capacity(capacity)), sequence: AtomicU64::new(0) }
    }

    pub fn record(&self, envelope: Envelope) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.history.lock();
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(StoredUpdate { envelope, sequence });
        sequence
    }

    /// Every recorded update with `sequence > from_sequence`, oldest first.
    /// Returns an empty vec (not an error) if `from_sequence` has already
    /// scrolled out of the buffer — the caller must fall back to a full
    /// reload in that case.
    pub fn since(&self, from_sequence: u64) -> Vec<Envelope> {
        self.history.lock().iter().filter(|u| u.sequence > from_sequence).map(|u| u.envelope.clone()).collect()
    }

    pub fn oldest_sequence(&self) -> Option<u64> {
        self.history.lock().front().map(|u| u.sequence)
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Envelope;
    use chrono::Utc;

    fn connected(id: &str) -> Envelope {
        Envelope::Connected { client_id: id.to_string(), timestamp: Utc::now() }
    }

    #[test]
    fn since_returns_only_updates_after_the_given_sequence() {
        let buffer = ReplayBuffer::new(10);
        buffer.record(connected("a"));
        let second = buffer.record(connected("b"));
        buffer.record(connected("c"));

        let replay = buffer.since(second - 1);
        assert_eq!(replay.len(), 2);
    }

    #[test]
    fn buffer_drops_oldest_entries_past_capacity() {
        let buffer = ReplayBuffer::new(2);
        buffer.record(connected("a"));
        buffer.record(connected("b"));
        buffer.record(connected("c"));
        assert_eq!(buffer.oldest_sequence(), Some(2));
    }
}
