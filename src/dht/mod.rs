//! A single DHT server endpoint: one UDP socket, one forged `NodeId`, and
//! the reader/spammer/bootstrap/gc task quartet described in the purpose
//! specification §4.2 and §5.
//!
//! The process runs a small pool of these (see [`crate::app`]), each bound
//! to its own ephemeral port, all feeding a shared [`crate::router`]
//! channel. Collapsing the reference crawler's one-process-per-server
//! fan-out into `tokio` tasks sharing one process is the only structural
//! redesign this module makes (see `REDESIGN FLAGS` in the specification).

pub mod fifo;
pub mod recent;
pub mod token;
pub mod transactions;
pub mod wire;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use dht_crawler_configuration::BootstrapNode;
use dht_crawler_primitives::compact::{self, KNode};
use dht_crawler_primitives::node_id::neighbor;
use dht_crawler_primitives::{InfoHash, NodeId, Peer};
use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout};
use tracing::{trace, warn};

use self::fifo::NodeFifo;
use self::recent::RecentHashes;
use self::token::TokenManager;
use self::transactions::TransactionTable;
use self::wire::{decode_message, encode_query, encode_reply, Message, Query, Reply};
use crate::router::{EventKind, InfoEvent, RouterHandle};
use crate::stats::{Event, StatsSender};

/// How often the bootstrap routers are re-queried, per the spec's
/// `Bootstrap` subsection.
const BOOTSTRAP_INTERVAL: Duration = Duration::from_secs(2);
/// How often the transaction table is GC'd and the token secret is checked
/// for rotation.
const GC_INTERVAL: Duration = Duration::from_secs(60);
/// The reader's `recvfrom` timeout: short enough that the reader and
/// spammer share the socket fairly.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// One DHT server: an independent identity, socket, and node FIFO.
pub struct DhtServer {
    id: NodeId,
    socket: UdpSocket,
    bind_ip: Ipv4Addr,
    fifo: Mutex<NodeFifo>,
    tokens: Mutex<TokenManager>,
    transactions: Mutex<TransactionTable>,
    recent_hashes: Mutex<RecentHashes>,
    router: RouterHandle,
    stats: StatsSender,
    bootstrap_nodes: Vec<BootstrapNode>,
    max_node_qsize: usize,
}

impl DhtServer {
    /// Binds a fresh UDP socket on an ephemeral port and forges a random
    /// identity for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(
        bind_ip: Ipv4Addr,
        bootstrap_nodes: Vec<BootstrapNode>,
        max_node_qsize: usize,
        router: RouterHandle,
        stats: StatsSender,
    ) -> std::io::Result<Arc<Self>> {
        let socket = UdpSocket::bind((bind_ip, 0)).await?;
        Ok(Arc::new(Self {
            id: NodeId::random(),
            socket,
            bind_ip,
            fifo: Mutex::new(NodeFifo::new(max_node_qsize)),
            tokens: Mutex::new(TokenManager::new()),
            transactions: Mutex::new(TransactionTable::new()),
            recent_hashes: Mutex::new(RecentHashes::default()),
            router,
            stats,
            bootstrap_nodes,
            max_node_qsize,
        }))
    }

    /// The socket's bound local address.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub async fn node_count(&self) -> usize {
        self.fifo.lock().await.len()
    }

    /// The reader task: pulls datagrams off the socket and dispatches them.
    /// Runs forever; pair with the spammer, bootstrap, and gc tasks.
    pub async fn run_reader(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        loop {
            match timeout(READ_TIMEOUT, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, SocketAddr::V4(from)))) => self.handle_datagram(&buf[..len], from).await,
                Ok(Ok((_, SocketAddr::V6(_)))) => {}
                Ok(Err(err)) => warn!(target: "dht_server", %err, "udp recv error"),
                Err(_) => {}
            }
        }
    }

    /// The find-node spam task: drains the node FIFO at `max_node_qsize` Hz.
    pub async fn run_spammer(self: Arc<Self>) {
        let hz = self.max_node_qsize.max(1) as f64;
        let mut ticker = interval(Duration::from_secs_f64(1.0 / hz));
        loop {
            ticker.tick().await;
            let drained = { self.fifo.lock().await.pop() };
            if let Some(node) = drained {
                let addr = SocketAddr::new(node.peer.ip.into(), node.peer.port);
                self.send_find_node(addr, node.id.bytes()).await;
            }
        }
    }

    /// The bootstrap task: every [`BOOTSTRAP_INTERVAL`], resolves each
    /// configured router and sends it a `find_node` toward a random target.
    pub async fn run_bootstrap(self: Arc<Self>) {
        let mut ticker = interval(BOOTSTRAP_INTERVAL);
        loop {
            ticker.tick().await;
            self.bootstrap_once().await;
        }
    }

    async fn bootstrap_once(&self) {
        for node in &self.bootstrap_nodes {
            let resolved = match tokio::net::lookup_host((node.host.as_str(), node.port)).await {
                Ok(addrs) => addrs.filter(SocketAddr::is_ipv4).collect::<Vec<_>>(),
                Err(err) => {
                    trace!(target: "dht_server", host = %node.host, %err, "bootstrap lookup failed");
                    continue;
                }
            };
            for addr in resolved {
                self.send_find_node(addr, random_target()).await;
            }
        }
    }

    /// The housekeeping task: GCs expired transactions and rotates the
    /// token secret, both every [`GC_INTERVAL`].
    pub async fn run_gc(self: Arc<Self>) {
        let mut ticker = interval(GC_INTERVAL);
        loop {
            ticker.tick().await;
            self.transactions.lock().await.gc();
            self.tokens.lock().await.maybe_rotate();
        }
    }

    async fn send_find_node(&self, address: SocketAddr, target: [u8; 20]) {
        if address.port() == 0 {
            return;
        }
        let sender_id = neighbor(&target, &self.id);
        let transaction_id = random_transaction_id();
        let message = encode_query(&transaction_id, &sender_id, &Query::FindNode { target });
        if self.socket.send_to(&message, address).await.is_err() {
            trace!(target: "dht_server", %address, "failed to send find_node");
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddrV4) {
        let message = match decode_message(datagram) {
            Ok(message) => message,
            Err(_) => {
                self.stats.send(Event::PacketDecodeFailed);
                return;
            }
        };

        match message {
            Message::Query {
                transaction_id,
                sender_id,
                query,
            } => self.handle_query(&transaction_id, sender_id, query, from).await,
            Message::Reply { transaction_id, reply } => self.handle_reply(&transaction_id, reply, from).await,
            Message::Error { .. } => {}
        }
    }

    async fn handle_query(&self, transaction_id: &[u8], sender_id: NodeId, query: Query, from: SocketAddrV4) {
        let peer = Peer::new(*from.ip(), from.port());
        let from_addr = SocketAddr::V4(from);

        match query {
            Query::Ping => {
                let reply = encode_reply(transaction_id, &self.id, None, b"");
                let _ = self.socket.send_to(&reply, from_addr).await;
            }
            Query::FindNode { target } => {
                let id = neighbor(&target, &self.id);
                let reply = encode_reply(transaction_id, &id, None, b"");
                let _ = self.socket.send_to(&reply, from_addr).await;
            }
            Query::GetPeers { info_hash } => {
                self.reply_to_get_peers(transaction_id, info_hash, peer, from_addr).await;
            }
            Query::AnnouncePeer {
                info_hash,
                port,
                token,
                implied_port,
            } => {
                self.reply_to_announce(transaction_id, sender_id, info_hash, port, &token, implied_port, peer, from_addr)
                    .await;
            }
        }

        self.learn_node(sender_id, peer).await;
    }

    async fn reply_to_get_peers(&self, transaction_id: &[u8], info_hash: InfoHash, peer: Peer, from_addr: SocketAddr) {
        // Empty `nodes` is deliberate: it keeps the response well-formed and
        // this server alive in remote routing tables while minimizing
        // outbound bandwidth.
        let id = neighbor(info_hash.as_bytes(), &self.id);
        let token = self.tokens.lock().await.token_for(peer.ip);
        let reply = encode_reply(transaction_id, &id, Some(&token), b"");
        let _ = self.socket.send_to(&reply, from_addr).await;

        if peer.is_private() {
            return;
        }
        if self.recent_hashes.lock().await.insert_if_new(info_hash) {
            self.router.emit(
                InfoEvent {
                    kind: EventKind::GetPeers,
                    info_hash,
                    peer,
                    announced_port: None,
                    implied_port: false,
                },
                &self.stats,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn reply_to_announce(
        &self,
        transaction_id: &[u8],
        sender_id: NodeId,
        info_hash: InfoHash,
        port: u16,
        token: &[u8],
        implied_port: bool,
        peer: Peer,
        from_addr: SocketAddr,
    ) {
        let id = neighbor(&sender_id.bytes(), &self.id);
        let reply = encode_reply(transaction_id, &id, None, b"");
        let _ = self.socket.send_to(&reply, from_addr).await;

        if peer.is_private() {
            return;
        }
        let valid = self.tokens.lock().await.is_valid(peer.ip, token);
        if valid && self.recent_hashes.lock().await.insert_if_new(info_hash) {
            self.router.emit(
                InfoEvent {
                    kind: EventKind::Announce,
                    info_hash,
                    peer,
                    announced_port: Some(port),
                    implied_port,
                },
                &self.stats,
            );
        }
    }

    async fn handle_reply(&self, transaction_id: &[u8], reply: Reply, from: SocketAddrV4) {
        let source_peer = Peer::new(*from.ip(), from.port());

        if let Some(sender_id) = reply.id {
            self.learn_node(sender_id, source_peer).await;
        }

        if !reply.nodes.is_empty() {
            for node in compact::decode_nodes(&reply.nodes) {
                self.learn_node(node.id, node.peer).await;
            }
        }

        if reply.values.is_empty() {
            return;
        }

        // Only emitted when this reply correlates to a `get_peers` we
        // actually sent (the spammer's `find_node`s never populate the
        // transaction table), matching the reference crawler where this
        // path is reachable but otherwise dormant.
        let Some(info_hash) = self.transactions.lock().await.info_hash_for(transaction_id) else {
            return;
        };

        for raw in &reply.values {
            let Some(peer) = compact::decode_peer(raw) else { continue };
            if peer.is_private() {
                continue;
            }
            self.router.emit(
                InfoEvent {
                    kind: EventKind::PeerValue,
                    info_hash,
                    peer,
                    announced_port: Some(peer.port),
                    implied_port: false,
                },
                &self.stats,
            );
        }
    }

    async fn learn_node(&self, id: NodeId, peer: Peer) {
        if peer.port == 0 || peer.is_private() || peer.ip == self.bind_ip {
            return;
        }
        self.fifo.lock().await.push(KNode::new(id, peer));
    }
}

fn random_target() -> [u8; 20] {
    let mut target = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut target);
    target
}

fn random_transaction_id() -> Vec<u8> {
    let mut id = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut id);
    id.to_vec()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::router;
    use crate::stats::Keeper;

    async fn spawn_server() -> (Arc<DhtServer>, SocketAddr) {
        let stats = Keeper::new_noop_sender();
        let (handle, router_task, _queue) = router::channel(16, 16, 1000, stats.clone());
        tokio::spawn(router_task.run());

        let server = DhtServer::bind(Ipv4Addr::LOCALHOST, vec![], 500, handle, stats).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(Arc::clone(&server).run_reader());
        (server, addr)
    }

    #[tokio::test]
    async fn answers_a_ping_query() {
        let (_server, addr) = spawn_server().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let query = encode_query(b"aa", &NodeId([9u8; 20]), &Query::Ping);
        client.send_to(&query, addr).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf)).await.unwrap().unwrap();
        let decoded = decode_message(&buf[..len]).unwrap();
        assert!(matches!(decoded, Message::Reply { .. }));
    }

    #[tokio::test]
    async fn answers_a_find_node_query_with_the_neighbor_id_and_no_nodes() {
        let (_server, addr) = spawn_server().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = [0x11u8; 20];
        let query = encode_query(b"bb", &NodeId([9u8; 20]), &Query::FindNode { target });
        client.send_to(&query, addr).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf)).await.unwrap().unwrap();
        let Message::Reply { reply, .. } = decode_message(&buf[..len]).unwrap() else {
            panic!("expected a reply");
        };
        assert!(reply.nodes.is_empty());
        assert_eq!(&reply.id.unwrap().bytes()[..10], &target[..10]);
    }

    #[tokio::test]
    async fn the_spammer_drains_the_fifo_into_find_node_queries() {
        let (server, _addr) = spawn_server().await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let SocketAddr::V4(client_addr) = client.local_addr().unwrap() else {
            unreachable!("loopback bind is always v4 here")
        };

        server
            .fifo
            .lock()
            .await
            .push(KNode::new(NodeId([3u8; 20]), Peer::new(*client_addr.ip(), client_addr.port())));

        tokio::spawn(Arc::clone(&server).run_spammer());

        let mut buf = [0u8; 256];
        let (len, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf)).await.unwrap().unwrap();
        let decoded = decode_message(&buf[..len]).unwrap();
        assert!(matches!(
            decoded,
            Message::Query {
                query: Query::FindNode { .. },
                ..
            }
        ));
    }
}
