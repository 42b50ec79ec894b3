//! The DHT crawler's core crawl-and-fetch pipeline.
//!
//! See [`bootstrap`] and [`app`] for how the pieces below are wired together
//! into a running process.

pub mod app;
pub mod blacklist;
pub mod bootstrap;
pub mod dht;
pub mod fetcher;
pub mod router;
pub mod servers;
pub mod sink;
pub mod stats;

use dht_crawler_clock::clock;

/// This code needs to be copied into each crate that wants a swappable clock.
/// Working version, for production.
#[cfg(not(test))]
#[allow(dead_code)]
pub(crate) type CurrentClock = clock::Working;

/// Stopped version, for testing.
#[cfg(test)]
#[allow(dead_code)]
pub(crate) type CurrentClock = clock::Stopped;
