//! DHT node identity and the "neighbor" ID synthesis trick the crawler
//! relies on to bias routing traffic toward itself.

use rand::RngCore;

/// Number of bytes in a DHT node ID (same width as an info-hash).
pub const NODE_ID_BYTES_LEN: usize = 20;

/// The prefix length used by [`neighbor`]: how many leading bytes of the
/// target are kept.
const NEIGHBOR_PREFIX_LEN: usize = 10;

/// A 20-byte Kademlia node identity.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default)]
pub struct NodeId(pub [u8; NODE_ID_BYTES_LEN]);

impl NodeId {
    /// Generates a node ID from a cryptographically-insecure fast RNG.
    ///
    /// A forged DHT identity has no security requirement on its bit
    /// pattern; only uniqueness and uniform distribution over the ID space
    /// matter here.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; NODE_ID_BYTES_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; NODE_ID_BYTES_LEN] {
        self.0
    }

    #[must_use]
    pub fn to_hex_string(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; NODE_ID_BYTES_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

/// Synthesizes a node ID that steers DHT routing toward `own`: the first
/// 10 bytes of `target` are kept (so the node looks close to `target` to
/// anyone doing XOR-distance routing) and the last 10 bytes of `own` are
/// kept (so responses and future queries about `target` keep landing back
/// on this node).
///
/// `target` can be any 20-byte identifier the caller wants to look close
/// to — a random ID while bootstrapping, a peer's node ID, or an
/// info-hash when answering `get_peers`/`announce_peer`.
#[must_use]
pub fn neighbor(target: &[u8; 20], own: &NodeId) -> NodeId {
    let mut id = [0u8; NODE_ID_BYTES_LEN];
    id[..NEIGHBOR_PREFIX_LEN].copy_from_slice(&target[..NEIGHBOR_PREFIX_LEN]);
    id[NEIGHBOR_PREFIX_LEN..].copy_from_slice(&own.0[NEIGHBOR_PREFIX_LEN..]);
    NodeId(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_keeps_target_prefix_and_own_suffix() {
        let target = [0xAAu8; 20];
        let own = NodeId([0xBBu8; 20]);

        let result = neighbor(&target, &own);

        assert_eq!(&result.0[..10], &target[..10]);
        assert_eq!(&result.0[10..], &own.0[10..]);
    }

    #[test]
    fn random_ids_are_not_trivially_equal() {
        assert_ne!(NodeId::random(), NodeId::random());
    }
}
