//! `(IPv4, port)` peer addresses as they flow through the crawler.
//!
//! The crawler is IPv4-only: the compact node/peer encodings in BEP-5 only
//! define a 4-byte address form, and the source network this was ported
//! from never exercised an IPv6 variant. See REDESIGN FLAGS.

use std::net::Ipv4Addr;

/// A `BitTorrent` peer address: an IPv4 host and a TCP/UDP port.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, derive_more::Constructor)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    /// Returns whether this peer's address is a private, loopback, or
    /// otherwise non-routable range that the crawler should never learn
    /// from or dial.
    ///
    /// Deliberately over-broad: it excludes the whole `172.0.0.0/8` block
    /// rather than just the `172.16.0.0/12` private range, matching the
    /// filter this crawler was ported from. See REDESIGN FLAGS.
    #[must_use]
    pub fn is_private(&self) -> bool {
        let octets = self.ip.octets();
        matches!(octets[0], 127 | 0 | 10 | 172) || (octets[0] == 192 && octets[1] == 168)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback() {
        assert!(Peer::new(Ipv4Addr::new(127, 0, 0, 1), 6881).is_private());
    }

    #[test]
    fn rejects_the_whole_172_block() {
        assert!(Peer::new(Ipv4Addr::new(172, 200, 1, 1), 6881).is_private());
    }

    #[test]
    fn rejects_192_168() {
        assert!(Peer::new(Ipv4Addr::new(192, 168, 1, 1), 6881).is_private());
    }

    #[test]
    fn accepts_a_routable_address() {
        assert!(!Peer::new(Ipv4Addr::new(203, 0, 113, 7), 6881).is_private());
    }
}
