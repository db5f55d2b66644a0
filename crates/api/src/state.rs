use std::sync::Arc;

use capture_domain::capture::CaptureService;
use capture_domain::channel::InMemoryEventChannel;
use capture_domain::ports::channel::EventChannel;
use capture_domain::ports::store::ResultStore;
use capture_domain::store::InMemoryResultStore;
use capture_infra::channel::RedisEventChannel;
use capture_infra::config::AppConfig;
use capture_infra::store::RedisResultStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub capture: CaptureService,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
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

        let capture = CaptureService::new(store, channel, capture_config);
        Ok(Self { config, capture })
    }

    pub fn with_components(
        config: AppConfig,
        store: Arc<dyn ResultStore>,
        channel: Arc<dyn EventChannel>,
    ) -> anyhow::Result<Self> {
        let capture_config = config.capture_config()?;
        let capture = CaptureService::new(store, channel, capture_config);
        Ok(Self { config, capture })
    }
}
