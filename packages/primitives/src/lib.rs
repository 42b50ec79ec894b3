//! Primitive types shared across the dht-crawler packages and binary.
//!
//! These are the small, dependency-light value types that flow through
//! every queue and wire boundary in the crawler: [`info_hash::InfoHash`]
//! identifies a torrent's content, [`node_id::NodeId`] identifies a DHT
//! node (ours or a peer's), and [`peer::Peer`] is a bare `(IPv4, port)`
//! pair. [`compact`] implements the fixed-width binary packing BEP-5 uses
//! to ship lists of nodes and peers over UDP.
use std::time::Duration;

pub mod compact;
pub mod info_hash;
pub mod node_id;
pub mod peer;

pub use info_hash::InfoHash;
pub use node_id::NodeId;
pub use peer::Peer;

/// A timestamp expressed as a duration since the Unix epoch.
///
/// Used throughout the crawler (token rotation, transaction expiry,
/// blacklist backoff windows, dedup-set resets) so every one of those can
/// be driven by [`dht_crawler_clock`](../dht_crawler_clock/index.html)'s
/// swappable clock in tests.
pub type DurationSinceUnixEpoch = Duration;
