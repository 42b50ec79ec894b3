//! The crawler's one-way output boundary (purpose specification §4.7).
//!
//! Fetcher workers only ever see the [`Sink`] trait: a single `accept` call
//! per hash-verified metadata blob. [`QueuedSink`] is the reference
//! implementation — a bounded channel plus a background task that batches
//! records by count or by timeout, whichever triggers first, mirroring the
//! reference crawler's `db_writer` batch-write worker.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use dht_crawler_primitives::InfoHash;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::info;

use crate::stats::{Event, StatsSender};

/// Default batch size and timeout, matching the reference crawler's
/// database writer defaults.
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A one-way consumer of hash-verified metadata blobs.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn accept(&self, info_hash: InfoHash, metadata: Vec<u8>, source_ip: Ipv4Addr);
}

struct Record {
    info_hash: InfoHash,
    metadata: Vec<u8>,
    source_ip: Ipv4Addr,
}

/// The reference [`Sink`]: hands records off to a bounded channel, batching
/// on the consuming side. A full channel drops the record and counts it
/// rather than applying backpressure to the fetcher that produced it.
pub struct QueuedSink {
    sender: mpsc::Sender<Record>,
    stats: StatsSender,
}

impl QueuedSink {
    /// Builds a sink and the receiver its batching task should be started
    /// with (see [`run_batcher`]).
    #[must_use]
    pub fn new(capacity: usize, stats: StatsSender) -> (Self, mpsc::Receiver<Record>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender, stats }, receiver)
    }
}

#[async_trait]
impl Sink for QueuedSink {
    async fn accept(&self, info_hash: InfoHash, metadata: Vec<u8>, source_ip: Ipv4Addr) {
        let record = Record { info_hash, metadata, source_ip };
        if self.sender.try_send(record).is_err() {
            self.stats.send(Event::SinkQueueDropped);
        }
    }
}

/// Drains `receiver`, flushing an aggregated batch-write log line whenever
/// `batch_size` records have accumulated or `batch_timeout` elapses since
/// the last flush, whichever comes first. Individual records are logged by
/// the fetcher worker that verified them, not here — this task only reports
/// on the batch as a whole, mirroring the reference crawler's writer, which
/// never logs a per-record line itself.
pub async fn run_batcher(mut receiver: mpsc::Receiver<Record>, batch_size: usize, batch_timeout: Duration) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = interval(batch_timeout);
    ticker.tick().await;

    loop {
        tokio::select! {
            record = receiver.recv() => {
                let Some(record) = record else {
                    flush(&mut batch);
                    return;
                };
                batch.push(record);
                if batch.len() >= batch_size {
                    flush(&mut batch);
                }
            }
            _ = ticker.tick() => {
                flush(&mut batch);
            }
        }
    }
}

fn flush(batch: &mut Vec<Record>) {
    if batch.is_empty() {
        return;
    }
    info!(target: "sink", "batch write completed: {} torrents saved", batch.len());
    batch.clear();
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration as TokioDuration;

    use super::*;
    use crate::stats::Keeper;

    #[tokio::test]
    async fn a_dropped_record_is_counted() {
        let (sender, repo) = Keeper::new_active_instance();
        let (sink, _receiver) = QueuedSink::new(0, sender);

        sink.accept(InfoHash([1u8; 20]), vec![1, 2, 3], Ipv4Addr::new(203, 0, 113, 7)).await;
        tokio::time::sleep(TokioDuration::from_millis(20)).await;

        assert_eq!(repo.get_stats().await.sink_queue_dropped, 1);
    }

    #[tokio::test]
    async fn the_batcher_flushes_once_batch_size_is_reached() {
        let (sink, receiver) = QueuedSink::new(10, Keeper::new_noop_sender());
        let batcher = tokio::spawn(run_batcher(receiver, 2, Duration::from_secs(60)));

        sink.accept(InfoHash([1u8; 20]), vec![1], Ipv4Addr::new(203, 0, 113, 1)).await;
        sink.accept(InfoHash([2u8; 20]), vec![2], Ipv4Addr::new(203, 0, 113, 2)).await;

        tokio::time::sleep(TokioDuration::from_millis(20)).await;
        batcher.abort();
    }
}
