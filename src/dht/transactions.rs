//! Pending `get_peers` transaction tracking, correlating a response back to
//! the info-hash its originating query asked about.

use std::collections::HashMap;
use std::time::Duration;

use dht_crawler_clock::clock::Time;
use dht_crawler_primitives::InfoHash;

use crate::CurrentClock;

/// Entries older than this are dropped by [`TransactionTable::gc`].
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// A per-server map of in-flight transaction IDs to the info-hash a
/// `get_peers` query asked about, plus the time it was sent.
#[derive(Default)]
pub struct TransactionTable {
    pending: HashMap<Vec<u8>, (InfoHash, Duration)>,
}

impl TransactionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, transaction_id: Vec<u8>, info_hash: InfoHash) {
        self.pending.insert(transaction_id, (info_hash, CurrentClock::now()));
    }

    #[must_use]
    pub fn info_hash_for(&self, transaction_id: &[u8]) -> Option<InfoHash> {
        self.pending.get(transaction_id).map(|(hash, _)| *hash)
    }

    /// Drops every pending transaction older than [`TRANSACTION_TIMEOUT`].
    pub fn gc(&mut self) {
        let now = CurrentClock::now();
        self.pending.retain(|_, (_, inserted_at)| now.saturating_sub(*inserted_at) <= TRANSACTION_TIMEOUT);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
