//! Event queue key with deterministic ordering.

use std::cmp::Ordering;
use std::time::Duration;

/// Key for ordering registrations in the queue.
///
/// Registrations are ordered by:
/// 1. Due time (earlier first)
/// 2. Sequence number (FIFO for the same due time)
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct EventKey {
    /// Virtual time at which this registration is due.
    pub time: Duration,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, sequence: u64) -> Self {
        Self { time, sequence }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_ordering() {
        let earlier = EventKey::new(Duration::from_secs(1), 2);
        let later = EventKey::new(Duration::from_secs(2), 1);
        assert!(earlier < later);
    }

    #[test]
    fn test_sequence_ordering_at_same_time() {
        let first = EventKey::new(Duration::from_secs(1), 1);
        let second = EventKey::new(Duration::from_secs(1), 2);
        assert!(first < second, "Same due time should fire in FIFO order");
    }
}
