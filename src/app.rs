//! The crawl-and-fetch pipeline's orchestrator (purpose specification §4.6).
//!
//! Following the teacher's `bootstrap::app` / `app::start` split: setup
//! (loading configuration, installing tracing) happens in [`crate::bootstrap`]
//! before this module ever runs. [`start`] only builds the domain objects —
//! the shared queues, the stats keeper, the blacklist, the sink — and spawns
//! every DHT server task, fetcher worker, sink worker and the periodic
//! reporter as an independent `tokio` task, returning their `JoinHandle`s.
//!
//! There is no single "application" future to await: once [`start`] returns,
//! the pipeline is already running. The binary entry point only waits on a
//! shutdown signal and then lets the process exit, which is how the
//! reference crawler behaves — in-flight TCP fetchers are killed by socket
//! close on process teardown, never drained gracefully.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use dht_crawler_configuration::Configuration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use crate::blacklist::Blacklist;
use crate::dht::DhtServer;
use crate::fetcher;
use crate::router;
use crate::sink::{self, QueuedSink, Sink};
use crate::stats::{Keeper, Repo};

/// How often the peer blacklist is swept for expired entries.
const BLACKLIST_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Builds every domain object described by the purpose specification and
/// spawns its tasks, returning their `JoinHandle`s.
///
/// # Errors
///
/// Returns an error if a DHT server's `UdpSocket` cannot be bound.
pub async fn start(config: &Configuration) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut jobs = Vec::new();

    let mut keeper = Keeper::new();
    let stats = keeper.run_event_listener();

    let (router_handle, router, metadata_queue) = router::channel(
        config.crawler.max_queue_size,
        config.crawler.max_queue_size,
        config.crawler.seen_set_limit,
        stats.clone(),
    );
    jobs.push(tokio::spawn(router.run()));

    let (sink, sink_receiver) = QueuedSink::new(config.crawler.sink_queue_size, stats.clone());
    let sink: Arc<dyn Sink> = Arc::new(sink);
    jobs.push(tokio::spawn(sink::run_batcher(
        sink_receiver,
        sink::DEFAULT_BATCH_SIZE,
        sink::DEFAULT_BATCH_TIMEOUT,
    )));

    for _ in 0..config.crawler.dht_servers {
        let server = DhtServer::bind(
            Ipv4Addr::UNSPECIFIED,
            config.bootstrap_nodes.clone(),
            config.crawler.max_node_qsize,
            router_handle.clone(),
            stats.clone(),
        )
        .await?;

        jobs.push(tokio::spawn(Arc::clone(&server).run_reader()));
        jobs.push(tokio::spawn(Arc::clone(&server).run_spammer()));
        jobs.push(tokio::spawn(Arc::clone(&server).run_bootstrap()));
        jobs.push(tokio::spawn(server.run_gc()));
    }

    let blacklist = Arc::new(Blacklist::new(
        Duration::from_secs(config.crawler.blacklist_base_secs),
        Duration::from_secs(config.crawler.blacklist_max_secs),
    ));
    jobs.push(tokio::spawn(run_blacklist_sweep(blacklist.clone())));

    let metadata_queue = Arc::new(Mutex::new(metadata_queue));
    let timeout_duration = Duration::from_secs(config.crawler.metadata_timeout_secs);
    for _ in 0..config.crawler.metadata_workers {
        jobs.push(tokio::spawn(fetcher::run_worker(
            metadata_queue.clone(),
            blacklist.clone(),
            stats.clone(),
            timeout_duration,
            sink.clone(),
        )));
    }

    jobs.push(tokio::spawn(run_reporter(
        metadata_queue,
        blacklist,
        keeper.repository.clone(),
        Duration::from_secs(config.crawler.print_interval_secs),
    )));

    Ok(jobs)
}

async fn run_blacklist_sweep(blacklist: Arc<Blacklist>) {
    let mut ticker = interval(BLACKLIST_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        blacklist.sweep().await;
    }
}

/// Logs the aggregated counter line the purpose specification asks for
/// every `print_interval`: pending metadata tasks, blacklist size, and the
/// `att/conn/hs/ok/fail` fetch lifecycle tallies.
async fn run_reporter(
    metadata_queue: Arc<Mutex<router::MetadataQueue>>,
    blacklist: Arc<Blacklist>,
    stats: Repo,
    interval_duration: Duration,
) {
    let mut ticker = interval(interval_duration);
    loop {
        ticker.tick().await;

        let queue_depth = metadata_queue.lock().await.len();
        let blacklist_size = blacklist.len().await;
        let metrics = *stats.get_stats().await;

        info!(
            target: "orchestrator",
            queue_depth,
            blacklist_size,
            att = metrics.att,
            conn = metrics.conn,
            hs = metrics.hs,
            ok = metrics.ok,
            fail = metrics.fail,
            "crawl-and-fetch pipeline status"
        );
    }
}
