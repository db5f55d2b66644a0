use std::time::Duration;

use capture_domain::capture::{CaptureConfig, SubmissionKeyStrategy};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub data_backend: String,
    pub redis_url: String,
    pub store_prefix: String,
    pub capture_topic: String,
    pub store_group: String,
    pub projection_group: String,
    pub key_strategy: String,
    pub publish_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub channel_block_ms: u64,
    pub worker_poll_interval_ms: u64,
    pub reclaim_interval_ms: u64,
    pub reclaim_idle_ms: u64,
    pub reclaim_batch: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("redis_url", "redis://127.0.0.1:6379")?
            .set_default("store_prefix", "capture")?
            .set_default("capture_topic", "survey-results")?
            .set_default("store_group", "capture-store")?
            .set_default("projection_group", "capture-projection")?
            .set_default("key_strategy", "fingerprint")?
            .set_default("publish_timeout_ms", 5_000)?
            .set_default("store_timeout_ms", 5_000)?
            .set_default("channel_block_ms", 2_000)?
            .set_default("worker_poll_interval_ms", 500)?
            .set_default("reclaim_interval_ms", 10_000)?
            .set_default("reclaim_idle_ms", 30_000)?
            .set_default("reclaim_batch", 50)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn capture_config(&self) -> Result<CaptureConfig, config::ConfigError> {
        let key_strategy = match self.key_strategy.as_str() {
            "fingerprint" => SubmissionKeyStrategy::Fingerprint,
            "request_id" => SubmissionKeyStrategy::ClientRequestId,
            other => {
                return Err(config::ConfigError::Message(format!(
                    "unknown key_strategy '{other}'"
                )));
            }
        };
        Ok(CaptureConfig {
            topic: self.capture_topic.clone(),
            store_group: self.store_group.clone(),
            projection_group: self.projection_group.clone(),
            key_strategy,
        })
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
