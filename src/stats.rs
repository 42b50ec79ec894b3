//! Crawl-and-fetch metrics: an event-sender/keeper/repository split adapted
//! from the teacher crate's `core::statistics` module.
//!
//! Every DHT server, router, and fetcher worker holds a cheap, cloneable
//! [`StatsSender`] and fires [`Event`]s into it with a plain (non-async,
//! non-blocking) `send`. A single keeper task drains those events and owns
//! the canonical [`Metrics`] behind a `tokio::sync::RwLock`; the
//! orchestrator's periodic reporter reads a snapshot through [`Repo`]
//! without ever touching the event channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// A statistics event fired by a worker. Counter names mirror the
/// `att/conn/hs/ok/fail` lifecycle counters from the purpose specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A metadata fetch attempt started (`att`).
    FetchAttempted,
    /// The fetch's TCP connection came up (`conn`).
    FetchConnected,
    /// The BT handshake completed (`hs`).
    FetchHandshaken,
    /// The metadata blob was hash-verified and handed to the sink (`ok`).
    FetchVerified,
    /// The fetch failed at any stage (`fail`).
    FetchFailed,
    /// An incoming DHT packet failed to decode and was dropped.
    PacketDecodeFailed,
    /// The info-event channel (DHT servers -> router) was full.
    EventQueueDropped,
    /// A metadata priority queue (router -> fetchers) was full.
    MetadataQueueDropped,
    /// The verified-record sink queue was full.
    SinkQueueDropped,
}

/// Point-in-time counters. Queue depths and blacklist size are gauges read
/// directly from their owning structures by the reporter, not accumulated
/// here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub att: u64,
    pub conn: u64,
    pub hs: u64,
    pub ok: u64,
    pub fail: u64,
    pub decode_errors: u64,
    pub event_queue_dropped: u64,
    pub metadata_queue_dropped: u64,
    pub sink_queue_dropped: u64,
}

/// The producing half: cloned into every DHT server, router, and fetcher worker.
#[derive(Clone)]
pub struct StatsSender {
    sender: mpsc::UnboundedSender<Event>,
}

impl StatsSender {
    /// Fires an event. Never blocks and never fails observably: if the
    /// keeper task has shut down, the event is silently discarded, matching
    /// the crawler's general loss-tolerant posture.
    pub fn send(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// The statistics keeper: owns the canonical [`Repo`] and, once started,
/// the background task draining the event channel into it.
pub struct Keeper {
    pub repository: Repo,
}

impl Default for Keeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Keeper {
    #[must_use]
    pub fn new() -> Self {
        Self { repository: Repo::new() }
    }

    /// Spawns the event-listener task and returns a sender for it.
    pub fn run_event_listener(&mut self) -> StatsSender {
        let (sender, receiver) = mpsc::unbounded_channel::<Event>();
        let repository = self.repository.clone();
        tokio::spawn(event_listener(receiver, repository));
        StatsSender { sender }
    }

    /// Builds a keeper, starts its listener, and returns the sender/repo pair.
    #[must_use]
    pub fn new_active_instance() -> (StatsSender, Repo) {
        let mut keeper = Self::new();
        let sender = keeper.run_event_listener();
        (sender, keeper.repository)
    }

    /// A sender whose events are drained and discarded. Useful in tests that
    /// only care about exercising a code path, not its counters.
    #[must_use]
    pub fn new_noop_sender() -> StatsSender {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move { while receiver.recv().await.is_some() {} });
        StatsSender { sender }
    }
}

async fn event_listener(mut receiver: mpsc::UnboundedReceiver<Event>, repository: Repo) {
    while let Some(event) = receiver.recv().await {
        event_handler(event, &repository).await;
    }
}

async fn event_handler(event: Event, repository: &Repo) {
    match event {
        Event::FetchAttempted => repository.increase_att().await,
        Event::FetchConnected => repository.increase_conn().await,
        Event::FetchHandshaken => repository.increase_hs().await,
        Event::FetchVerified => repository.increase_ok().await,
        Event::FetchFailed => repository.increase_fail().await,
        Event::PacketDecodeFailed => repository.increase_decode_errors().await,
        Event::EventQueueDropped => repository.increase_event_queue_dropped().await,
        Event::MetadataQueueDropped => repository.increase_metadata_queue_dropped().await,
        Event::SinkQueueDropped => repository.increase_sink_queue_dropped().await,
    }

    debug!(target: "stats", "{:?}", repository.get_stats().await);
}

/// The canonical metrics store, cheaply cloneable (an `Arc<RwLock<..>>` handle).
#[derive(Clone)]
pub struct Repo {
    metrics: Arc<RwLock<Metrics>>,
}

impl Default for Repo {
    fn default() -> Self {
        Self::new()
    }
}

impl Repo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    pub async fn get_stats(&self) -> RwLockReadGuard<'_, Metrics> {
        self.metrics.read().await
    }

    pub async fn increase_att(&self) {
        self.metrics.write().await.att += 1;
    }

    pub async fn increase_conn(&self) {
        self.metrics.write().await.conn += 1;
    }

    pub async fn increase_hs(&self) {
        self.metrics.write().await.hs += 1;
    }

    pub async fn increase_ok(&self) {
        self.metrics.write().await.ok += 1;
    }

    pub async fn increase_fail(&self) {
        self.metrics.write().await.fail += 1;
    }

    pub async fn increase_decode_errors(&self) {
        self.metrics.write().await.decode_errors += 1;
    }

    pub async fn increase_event_queue_dropped(&self) {
        self.metrics.write().await.event_queue_dropped += 1;
    }

    pub async fn increase_metadata_queue_dropped(&self) {
        self.metrics.write().await.metadata_queue_dropped += 1;
    }

    pub async fn increase_sink_queue_dropped(&self) {
        self.metrics.write().await.sink_queue_dropped += 1;
    }
}
