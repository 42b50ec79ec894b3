//! Fixed-width binary packing for BEP-5 compact node and peer lists.
//!
//! - A compact node record is 26 bytes: `nodeid(20) || ipv4(4) || port(2, big-endian)`.
//! - A compact peer record (inside a `get_peers` response's `values` list) is
//!   6 bytes: `ipv4(4) || port(2, big-endian)`.

use std::net::Ipv4Addr;

use crate::node_id::{NodeId, NODE_ID_BYTES_LEN};
use crate::peer::Peer;

/// A node learned from the DHT: its claimed identity and address.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, derive_more::Constructor)]
pub struct KNode {
    pub id: NodeId,
    pub peer: Peer,
}

const NODE_RECORD_LEN: usize = NODE_ID_BYTES_LEN + 6;
const PEER_RECORD_LEN: usize = 6;

/// Encodes a slice of nodes into the compact 26-byte-per-node wire form.
#[must_use]
pub fn encode_nodes(nodes: &[KNode]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * NODE_RECORD_LEN);
    for node in nodes {
        out.extend_from_slice(&node.id.bytes());
        out.extend_from_slice(&node.peer.ip.octets());
        out.extend_from_slice(&node.peer.port.to_be_bytes());
    }
    out
}

/// Decodes a compact node list. A buffer whose length is not a multiple of
/// 26 is malformed; rather than fail the whole packet it decodes no nodes,
/// matching how the rest of the crawler treats a garbled `nodes` field as
/// "nothing learned" rather than a fatal error.
#[must_use]
pub fn decode_nodes(bytes: &[u8]) -> Vec<KNode> {
    if bytes.len() % NODE_RECORD_LEN != 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(NODE_RECORD_LEN)
        .map(|chunk| {
            let mut id = [0u8; NODE_ID_BYTES_LEN];
            id.copy_from_slice(&chunk[..NODE_ID_BYTES_LEN]);
            let ip = Ipv4Addr::new(chunk[20], chunk[21], chunk[22], chunk[23]);
            let port = u16::from_be_bytes([chunk[24], chunk[25]]);
            KNode::new(NodeId(id), Peer::new(ip, port))
        })
        .collect()
}

/// Encodes a slice of peer addresses into the compact 6-byte-per-peer wire
/// form used in a `get_peers` response's `values` list.
#[must_use]
pub fn encode_peers(peers: &[Peer]) -> Vec<Vec<u8>> {
    peers
        .iter()
        .map(|peer| {
            let mut record = Vec::with_capacity(PEER_RECORD_LEN);
            record.extend_from_slice(&peer.ip.octets());
            record.extend_from_slice(&peer.port.to_be_bytes());
            record
        })
        .collect()
}

/// Decodes a single compact peer record. Returns `None` if `bytes` is not
/// exactly 6 bytes long.
#[must_use]
pub fn decode_peer(bytes: &[u8]) -> Option<Peer> {
    if bytes.len() != PEER_RECORD_LEN {
        return None;
    }
    let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let port = u16::from_be_bytes([bytes[4], bytes[5]]);
    Some(Peer::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_node_list() {
        let nodes = vec![
            KNode::new(NodeId([1u8; 20]), Peer::new(Ipv4Addr::new(1, 2, 3, 4), 6881)),
            KNode::new(NodeId([2u8; 20]), Peer::new(Ipv4Addr::new(5, 6, 7, 8), 51413)),
        ];
        let encoded = encode_nodes(&nodes);
        assert_eq!(encoded.len(), 52);
        assert_eq!(decode_nodes(&encoded), nodes);
    }

    #[test]
    fn malformed_node_list_length_decodes_to_empty() {
        assert!(decode_nodes(&[0u8; 25]).is_empty());
    }

    #[test]
    fn round_trips_a_peer_record() {
        let peer = Peer::new(Ipv4Addr::new(203, 0, 113, 7), 6881);
        let encoded = &encode_peers(std::slice::from_ref(&peer))[0];
        assert_eq!(decode_peer(encoded), Some(peer));
    }

    #[test]
    fn rejects_malformed_peer_record() {
        assert_eq!(decode_peer(&[1, 2, 3]), None);
    }
}
