//! `get_peers`/`announce_peer` token issuance and validation.
//!
//! A token is `SHA1(secret ‖ peer_ip)[0:2]`. The secret rotates every
//! [`ROTATION_INTERVAL`]; the previous secret is kept around so a token
//! issued just before a rotation still validates on the following
//! `announce_peer`.

use std::net::Ipv4Addr;
use std::time::Duration;

use dht_crawler_clock::clock::Time;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::CurrentClock;

/// How often the signing secret rotates.
pub const ROTATION_INTERVAL: Duration = Duration::from_secs(300);

pub struct TokenManager {
    current_secret: [u8; 20],
    previous_secret: [u8; 20],
    rotated_at: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_secret: random_secret(),
            previous_secret: random_secret(),
            rotated_at: CurrentClock::now(),
        }
    }

    /// Rotates the secret if [`ROTATION_INTERVAL`] has elapsed since the
    /// last rotation. No-op otherwise.
    pub fn maybe_rotate(&mut self) {
        let now = CurrentClock::now();
        if now.saturating_sub(self.rotated_at) >= ROTATION_INTERVAL {
            self.previous_secret = self.current_secret;
            self.current_secret = random_secret();
            self.rotated_at = now;
        }
    }

    /// The token a `get_peers` response should hand back to `ip`.
    #[must_use]
    pub fn token_for(&self, ip: Ipv4Addr) -> Vec<u8> {
        token(&self.current_secret, ip)
    }

    /// Whether `token` is a valid token for `ip` under the current or
    /// immediately-previous secret.
    #[must_use]
    pub fn is_valid(&self, ip: Ipv4Addr, candidate: &[u8]) -> bool {
        candidate == token(&self.current_secret, ip).as_slice() || candidate == token(&self.previous_secret, ip).as_slice()
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}

fn random_secret() -> [u8; 20] {
    let mut secret = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

fn token(secret: &[u8; 20], ip: Ipv4Addr) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(secret);
    hasher.update(ip.octets());
    hasher.finalize()[0..2].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_a_token_that_validates_against_itself() {
        let manager = TokenManager::new();
        let ip = Ipv4Addr::new(203, 0, 113, 7);
        let token = manager.token_for(ip);
        assert!(manager.is_valid(ip, &token));
    }

    #[test]
    fn rejects_a_token_issued_for_a_different_ip() {
        let manager = TokenManager::new();
        let token = manager.token_for(Ipv4Addr::new(203, 0, 113, 7));
        assert!(!manager.is_valid(Ipv4Addr::new(203, 0, 113, 8), &token));
    }

    #[test]
    fn a_token_from_the_previous_epoch_remains_valid_after_one_rotation() {
        let mut manager = TokenManager::new();
        let ip = Ipv4Addr::new(198, 51, 100, 4);
        let old_token = manager.token_for(ip);

        manager.previous_secret = manager.current_secret;
        manager.current_secret = random_secret();

        assert!(manager.is_valid(ip, &old_token));
    }

    #[test]
    fn a_token_from_two_epochs_ago_is_rejected() {
        let mut manager = TokenManager::new();
        let ip = Ipv4Addr::new(198, 51, 100, 4);
        let old_token = manager.token_for(ip);

        manager.previous_secret = manager.current_secret;
        manager.current_secret = random_secret();
        manager.previous_secret = manager.current_secret;
        manager.current_secret = random_secret();

        assert!(!manager.is_valid(ip, &old_token));
    }
}
