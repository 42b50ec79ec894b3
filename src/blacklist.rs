//! Adaptive exponential-backoff filter keyed by peer IP.
//!
//! A peer that fails a metadata fetch is banned for `min(base * failures,
//! max)`; a successful fetch evicts the entry outright. Metadata fetcher
//! workers share one instance behind an `Arc`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use dht_crawler_clock::clock::Time;
use tokio::sync::Mutex;

use crate::CurrentClock;

struct Entry {
    banned_at: Duration,
    failures: u32,
}

/// The adaptive IP blacklist described in the purpose specification §4.5.
pub struct Blacklist {
    entries: Mutex<HashMap<Ipv4Addr, Entry>>,
    base: Duration,
    max: Duration,
}

impl Blacklist {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            base,
            max,
        }
    }

    fn ban_duration(&self, failures: u32) -> Duration {
        self.base.saturating_mul(failures).min(self.max)
    }

    /// Whether a fetch against `ip` is currently allowed. Evicts an expired
    /// entry as a side effect, so a subsequent failure starts counting from
    /// `failures = 1` again only if the entry was actually removed here.
    pub async fn admit(&self, ip: Ipv4Addr) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(&ip) else {
            return true;
        };

        let now = CurrentClock::now();
        if now.saturating_sub(entry.banned_at) < self.ban_duration(entry.failures) {
            return false;
        }

        entries.remove(&ip);
        true
    }

    /// Records a fetch failure against `ip`, extending its ban window.
    pub async fn record_failure(&self, ip: Ipv4Addr) {
        let mut entries = self.entries.lock().await;
        let failures = entries.get(&ip).map_or(0, |entry| entry.failures) + 1;
        entries.insert(
            ip,
            Entry {
                banned_at: CurrentClock::now(),
                failures,
            },
        );
    }

    /// Clears any ban on `ip`, e.g. after a successful fetch.
    pub async fn clear(&self, ip: Ipv4Addr) {
        self.entries.lock().await.remove(&ip);
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops every entry whose ban window has already expired, so the map
    /// does not grow unboundedly from peers that are never retried.
    pub async fn sweep(&self) {
        let now = CurrentClock::now();
        let base = self.base;
        let max = self.max;
        self.entries
            .lock()
            .await
            .retain(|_, entry| now.saturating_sub(entry.banned_at) < base.saturating_mul(entry.failures).min(max));
    }
}

#[cfg(test)]
mod tests {
    use dht_crawler_clock::clock::stopped::Stopped as _;
    use dht_crawler_clock::clock::Stopped;

    use super::*;

    fn ip() -> Ipv4Addr {
        Ipv4Addr::new(203, 0, 113, 7)
    }

    #[tokio::test]
    async fn admits_an_ip_with_no_history() {
        let blacklist = Blacklist::new(Duration::from_secs(180), Duration::from_secs(1800));
        assert!(blacklist.admit(ip()).await);
    }

    #[tokio::test]
    async fn rejects_within_the_backoff_window_and_admits_after_it_elapses() {
        Stopped::local_reset();
        let blacklist = Blacklist::new(Duration::from_secs(180), Duration::from_secs(1800));

        blacklist.record_failure(ip()).await;
        blacklist.record_failure(ip()).await;
        blacklist.record_failure(ip()).await;

        Stopped::local_add(&Duration::from_secs(179)).unwrap();
        assert!(!blacklist.admit(ip()).await);

        Stopped::local_add(&Duration::from_secs(541 - 179)).unwrap();
        assert!(blacklist.admit(ip()).await);
    }

    #[tokio::test]
    async fn ban_duration_is_capped_at_the_configured_max() {
        Stopped::local_reset();
        let blacklist = Blacklist::new(Duration::from_secs(180), Duration::from_secs(1800));

        for _ in 0..50 {
            blacklist.record_failure(ip()).await;
        }

        Stopped::local_add(&Duration::from_secs(1799)).unwrap();
        assert!(!blacklist.admit(ip()).await);

        Stopped::local_add(&Duration::from_secs(2)).unwrap();
        assert!(blacklist.admit(ip()).await);
    }

    #[tokio::test]
    async fn clearing_an_entry_admits_immediately() {
        Stopped::local_reset();
        let blacklist = Blacklist::new(Duration::from_secs(180), Duration::from_secs(1800));
        blacklist.record_failure(ip()).await;
        blacklist.clear(ip()).await;
        assert!(blacklist.admit(ip()).await);
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_entries() {
        Stopped::local_reset();
        let blacklist = Blacklist::new(Duration::from_secs(180), Duration::from_secs(1800));
        blacklist.record_failure(ip()).await;
        blacklist.record_failure(Ipv4Addr::new(198, 51, 100, 9)).await;

        Stopped::local_add(&Duration::from_secs(181)).unwrap();
        blacklist.sweep().await;

        assert_eq!(blacklist.len().await, 1);
    }
}
