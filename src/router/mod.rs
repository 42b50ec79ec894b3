//! The Info Event Router: turns the raw stream of `info_events` harvested by
//! every DHT server into a deduplicated, priority-ordered metadata fetch
//! queue.
//!
//! Priority is expressed structurally rather than as a sortable field: three
//! bounded channels, one per [`EventKind`], feed a single [`MetadataQueue`]
//! receiver that drains them with a biased `select!` so an `Announce` task
//! is always preferred over a `PeerValue` task, which is in turn preferred
//! over a `GetPeers` task.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use dht_crawler_primitives::{InfoHash, Peer};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::stats::{Event, StatsSender};

/// The target port fallback used whenever an event carries no usable port.
const DEFAULT_PORT: u16 = 6881;

/// What kind of DHT traffic produced an [`InfoEvent`], in descending
/// fetch-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// An `announce_peer` query: the peer claims to hold the torrent right now.
    Announce,
    /// A peer address harvested from a `get_peers` response's `values` list.
    PeerValue,
    /// A `get_peers` query: the peer is merely looking for the torrent.
    GetPeers,
}

/// A raw observation emitted by a DHT server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoEvent {
    pub kind: EventKind,
    pub info_hash: InfoHash,
    /// For [`EventKind::Announce`] and [`EventKind::GetPeers`], the querier's
    /// address. For [`EventKind::PeerValue`], the candidate peer address
    /// decoded from the response's `values` list.
    pub peer: Peer,
    /// The `port` argument of an `announce_peer` query, when present.
    pub announced_port: Option<u16>,
    pub implied_port: bool,
}

impl InfoEvent {
    fn target_port(&self) -> u16 {
        match self.kind {
            EventKind::Announce => {
                let resolved = if self.implied_port { self.peer.port } else { self.announced_port.unwrap_or(0) };
                if resolved == 0 {
                    DEFAULT_PORT
                } else {
                    resolved
                }
            }
            EventKind::PeerValue | EventKind::GetPeers => {
                if self.peer.port == 0 {
                    DEFAULT_PORT
                } else {
                    self.peer.port
                }
            }
        }
    }
}

/// A deduplicated, prioritized unit of work for the metadata fetcher pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTask {
    pub info_hash: InfoHash,
    pub ip: Ipv4Addr,
    pub target_port: u16,
}

/// The producing half of the priority queue, cloned into every DHT server.
#[derive(Clone)]
pub struct RouterHandle {
    events: mpsc::Sender<InfoEvent>,
}

impl RouterHandle {
    /// Hands an observation to the router. Never blocks: under sustained
    /// backpressure the event is dropped and counted.
    pub fn emit(&self, event: InfoEvent, stats: &StatsSender) {
        if self.events.try_send(event).is_err() {
            stats.send(Event::EventQueueDropped);
        }
    }
}

/// The consuming half of the priority queue, held by the fetcher pool.
pub struct MetadataQueue {
    announce: mpsc::Receiver<FetchTask>,
    peer_value: mpsc::Receiver<FetchTask>,
    get_peers: mpsc::Receiver<FetchTask>,
}

impl MetadataQueue {
    /// Pops the highest-priority task currently available, waiting if the
    /// queue is empty. Resolves to `None` once every producer has dropped.
    pub async fn recv(&mut self) -> Option<FetchTask> {
        tokio::select! {
            biased;
            Some(task) = self.announce.recv() => Some(task),
            Some(task) = self.peer_value.recv() => Some(task),
            Some(task) = self.get_peers.recv() => Some(task),
            else => None,
        }
    }

    /// Total number of tasks currently buffered across all three priority
    /// channels. Used by the orchestrator's periodic stats line.
    #[must_use]
    pub fn len(&self) -> usize {
        self.announce.len() + self.peer_value.len() + self.get_peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct PrioritySender {
    announce: mpsc::Sender<FetchTask>,
    peer_value: mpsc::Sender<FetchTask>,
    get_peers: mpsc::Sender<FetchTask>,
}

impl PrioritySender {
    fn try_send(&self, kind: EventKind, task: FetchTask) -> Result<(), ()> {
        let sender = match kind {
            EventKind::Announce => &self.announce,
            EventKind::PeerValue => &self.peer_value,
            EventKind::GetPeers => &self.get_peers,
        };
        sender.try_send(task).map_err(|_| ())
    }
}

/// Builds the channel pair: a [`RouterHandle`] for DHT servers to push raw
/// events into, and the [`Router`] task that drains, dedups, and
/// re-prioritizes them into a [`MetadataQueue`].
#[must_use]
pub fn channel(event_queue_size: usize, metadata_queue_size: usize, seen_set_limit: usize, stats: StatsSender) -> (RouterHandle, Router, MetadataQueue) {
    let (events_tx, events_rx) = mpsc::channel(event_queue_size);
    let (announce_tx, announce_rx) = mpsc::channel(metadata_queue_size);
    let (peer_value_tx, peer_value_rx) = mpsc::channel(metadata_queue_size);
    let (get_peers_tx, get_peers_rx) = mpsc::channel(metadata_queue_size);

    let handle = RouterHandle { events: events_tx };
    let router = Router {
        events: events_rx,
        queue: PrioritySender {
            announce: announce_tx,
            peer_value: peer_value_tx,
            get_peers: get_peers_tx,
        },
        seen: HashSet::new(),
        seen_set_limit,
        stats,
    };
    let queue = MetadataQueue {
        announce: announce_rx,
        peer_value: peer_value_rx,
        get_peers: get_peers_rx,
    };

    (handle, router, queue)
}

/// The single-consumer router task. Owns the dedup seen-set exclusively, so
/// it never needs a lock.
pub struct Router {
    events: mpsc::Receiver<InfoEvent>,
    queue: PrioritySender,
    seen: HashSet<(InfoHash, Ipv4Addr)>,
    seen_set_limit: usize,
    stats: StatsSender,
}

impl Router {
    /// Drains events until every [`RouterHandle`] has been dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: InfoEvent) {
        let key = (event.info_hash, event.peer.ip);
        if !self.seen.insert(key) {
            trace!(target: "router", info_hash = %event.info_hash, "duplicate fetch task suppressed");
            return;
        }

        if self.seen.len() > self.seen_set_limit {
            debug!(target: "router", limit = self.seen_set_limit, "seen-set limit exceeded, resetting");
            self.seen.clear();
        }

        let task = FetchTask {
            info_hash: event.info_hash,
            ip: event.peer.ip,
            target_port: event.target_port(),
        };

        if self.queue.try_send(event.kind, task).is_err() {
            self.stats.send(Event::MetadataQueueDropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::stats::Keeper;

    fn event(kind: EventKind, hash_byte: u8, ip: Ipv4Addr, port: u16) -> InfoEvent {
        InfoEvent {
            kind,
            info_hash: InfoHash::from([hash_byte; 20]),
            peer: Peer::new(ip, port),
            announced_port: None,
            implied_port: false,
        }
    }

    #[tokio::test]
    async fn pops_announce_before_peer_value_before_get_peers() {
        let (handle, router, mut queue) = channel(16, 16, 1000, Keeper::new_noop_sender());
        tokio::spawn(router.run());

        let ip = Ipv4Addr::new(203, 0, 113, 1);

        handle.emit(event(EventKind::GetPeers, 3, ip, 6881), &Keeper::new_noop_sender());
        handle.emit(event(EventKind::PeerValue, 2, ip, 6882), &Keeper::new_noop_sender());
        handle.emit(event(EventKind::Announce, 1, ip, 6883), &Keeper::new_noop_sender());

        // give the router task a chance to drain and re-route
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let first = queue.recv().await.unwrap();
        assert_eq!(first.info_hash, InfoHash::from([1u8; 20]));
    }

    #[test]
    fn announce_falls_back_to_the_default_port_when_unset() {
        let event = event(EventKind::Announce, 1, Ipv4Addr::new(1, 2, 3, 4), 6881);
        assert_eq!(event.target_port(), DEFAULT_PORT);
    }

    #[test]
    fn announce_uses_the_source_port_when_implied() {
        let mut event = event(EventKind::Announce, 1, Ipv4Addr::new(1, 2, 3, 4), 6881);
        event.implied_port = true;
        assert_eq!(event.target_port(), 6881);
    }
}
