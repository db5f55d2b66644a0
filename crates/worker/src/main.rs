mod observability;
mod runner;

use std::sync::Arc;

use capture_domain::capture::CaptureService;
use capture_domain::channel::InMemoryEventChannel;
use capture_domain::ports::channel::EventChannel;
use capture_domain::ports::store::ResultStore;
use capture_domain::store::InMemoryResultStore;
use capture_infra::channel::RedisEventChannel;
use capture_infra::config::AppConfig;
use capture_infra::logging::init_tracing;
use capture_infra::store::RedisResultStore;
use std::time::Duration;
use tracing::info;

use crate::runner::{WorkerRunner, WorkerTimings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let capture_config = config.capture_config()?;
    let (store, channel): (Arc<dyn ResultStore>, Arc<dyn EventChannel>) =
        if config.data_backend.eq_ignore_ascii_case("memory") {
            (
                Arc::new(InMemoryResultStore::new()),
                Arc::new(InMemoryEventChannel::new()),
            )
        } else {
            let store = RedisResultStore::connect(
                &config.redis_url,
                &config.store_prefix,
                config.store_timeout(),
            )
            .await?;
            let channel =
                RedisEventChannel::connect(&config.redis_url, config.publish_timeout()).await?;
            (Arc::new(store), Arc::new(channel))
        };

    let capture = CaptureService::new(store, channel.clone(), capture_config);
    let timings = WorkerTimings {
        block: Duration::from_millis(config.channel_block_ms),
        poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
        reclaim_interval: Duration::from_millis(config.reclaim_interval_ms),
        reclaim_idle: Duration::from_millis(config.reclaim_idle_ms),
        reclaim_batch: config.reclaim_batch,
    };
    let runner = Arc::new(WorkerRunner::new(capture, channel, timings));

    info!(backend = %config.data_backend, "capture worker starting");

    let store_runner = runner.clone();
    let store_loop = tokio::spawn(async move { store_runner.run_store_loop().await });
    let projection_runner = runner.clone();
    let projection_loop = tokio::spawn(async move { projection_runner.run_projection_loop().await });
    let reclaim_runner = runner.clone();
    let reclaim_loop = tokio::spawn(async move { reclaim_runner.run_reclaim_loop().await });

    let _ = tokio::signal::ctrl_c().await;
    info!("capture worker shutting down");

    store_loop.abort();
    projection_loop.abort();
    reclaim_loop.abort();

    Ok(())
}
