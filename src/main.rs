//! Binary entry point: load configuration, set up tracing, start the
//! crawl-and-fetch pipeline, then block until a shutdown signal arrives.
//!
//! The process exits ungracefully on `SIGINT`/`SIGTERM`: every spawned task
//! is simply dropped along with the `tokio` runtime. In-flight TCP fetches
//! are torn down by socket close, not by a graceful drain, matching the
//! reference crawler's fan-out-of-processes design (see the purpose
//! specification's Non-goals and §5).

use clap::Parser;
use dht_crawler::bootstrap::config::Args;
use dht_crawler::servers::signals::global_shutdown_signal;
use dht_crawler::{app, bootstrap};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = bootstrap::config::initialize_configuration(&args)?;
    bootstrap::tracing::setup(&config)?;

    info!(
        dht_servers = config.crawler.dht_servers,
        metadata_workers = config.crawler.metadata_workers,
        "starting the dht-crawler pipeline"
    );

    let _jobs = app::start(&config).await?;

    global_shutdown_signal().await;
    info!("shutdown signal received, exiting");

    Ok(())
}
