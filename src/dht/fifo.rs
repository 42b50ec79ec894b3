//! Bounded FIFO of recently-learned DHT nodes.
//!
//! Mutated by both the UDP reader (on incoming responses) and the spammer
//! loop (draining nodes to query); callers serialize access with a
//! `tokio::sync::Mutex`.

use std::collections::VecDeque;

use dht_crawler_primitives::compact::KNode;

/// A `KNode` queue bounded to `capacity` entries. Pushing past capacity
/// discards the oldest entry, matching the reference crawler's
/// `collections.deque(maxlen=...)`.
pub struct NodeFifo {
    nodes: VecDeque<KNode>,
    capacity: usize,
}

impl NodeFifo {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            nodes: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, node: KNode) {
        if self.nodes.len() >= self.capacity {
            self.nodes.pop_front();
        }
        self.nodes.push_back(node);
    }

    pub fn pop(&mut self) -> Option<KNode> {
        self.nodes.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use dht_crawler_primitives::{NodeId, Peer};

    use super::*;

    fn node(byte: u8) -> KNode {
        KNode::new(NodeId([byte; 20]), Peer::new(Ipv4Addr::new(203, 0, 113, byte), 6881))
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut fifo = NodeFifo::new(3);
        fifo.push(node(1));
        fifo.push(node(2));
        assert_eq!(fifo.pop().unwrap().id, NodeId([1; 20]));
        assert_eq!(fifo.pop().unwrap().id, NodeId([2; 20]));
        assert!(fifo.pop().is_none());
    }

    #[test]
    fn discards_the_oldest_entry_on_overflow() {
        let mut fifo = NodeFifo::new(2);
        fifo.push(node(1));
        fifo.push(node(2));
        fifo.push(node(3));

        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.pop().unwrap().id, NodeId([2; 20]));
        assert_eq!(fifo.pop().unwrap().id, NodeId([3; 20]));
    }
}
