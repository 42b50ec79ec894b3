//! A small bounded ring suppressing duplicate emission of the same
//! info-hash seen repeatedly within a short window.

use std::collections::{HashSet, VecDeque};

use dht_crawler_primitives::InfoHash;

/// Size of the ring used by each DHT server, per the purpose specification.
pub const CAPACITY: usize = 2000;

pub struct RecentHashes {
    order: VecDeque<InfoHash>,
    seen: HashSet<InfoHash>,
    capacity: usize,
}

impl RecentHashes {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Inserts `hash`, returning `true` if it was not already present. On
    /// overflow the oldest entry is evicted to make room.
    pub fn insert_if_new(&mut self, hash: InfoHash) -> bool {
        if !self.seen.insert(hash) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(hash);
        true
    }
}

impl Default for RecentHashes {
    fn default() -> Self {
        Self::new(CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_a_duplicate_within_capacity() {
        let mut recent = RecentHashes::new(10);
        let hash = InfoHash::from([1u8; 20]);
        assert!(recent.insert_if_new(hash));
        assert!(!recent.insert_if_new(hash));
    }

    #[test]
    fn forgets_the_oldest_entry_once_capacity_is_exceeded() {
        let mut recent = RecentHashes::new(2);
        let a = InfoHash::from([1u8; 20]);
        let b = InfoHash::from([2u8; 20]);
        let c = InfoHash::from([3u8; 20]);

        recent.insert_if_new(a);
        recent.insert_if_new(b);
        recent.insert_if_new(c);

        assert!(recent.insert_if_new(a));
    }
}
