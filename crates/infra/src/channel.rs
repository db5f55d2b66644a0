use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capture_domain::event::{CaptureEvent, EventFilter};
use capture_domain::ports::BoxFuture;
use capture_domain::ports::channel::{ChannelError, Delivery, EventChannel};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply};
use tokio::time::timeout;

const EVENT_FIELD: &str = "event";
const KEY_FIELD: &str = "key";

/// Channel gateway backed by Redis Streams: one stream per topic, one
/// consumer group per logical subscription. A stream is a total order, so
/// per-key ordering holds for every key; XACK-less deliveries are
/// redelivered through XAUTOCLAIM.
#[derive(Clone)]
pub struct RedisEventChannel {
    manager: ConnectionManager,
    consumer: String,
    op_timeout: Duration,
    known_groups: Arc<Mutex<HashSet<String>>>,
}

impl RedisEventChannel {
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self, ChannelError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| ChannelError::Unavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| ChannelError::Unavailable(err.to_string()))?;
        Ok(Self {
            manager,
            consumer: format!("consumer-{}", capture_domain::util::uuid_v7_without_dashes()),
            op_timeout,
            known_groups: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn serialize(event: &CaptureEvent) -> Result<String, ChannelError> {
        serde_json::to_string(event).map_err(|err| ChannelError::Serialization(err.to_string()))
    }

    fn deserialize(payload: &str) -> Result<CaptureEvent, ChannelError> {
        serde_json::from_str(payload).map_err(|err| ChannelError::Serialization(err.to_string()))
    }

    fn parse_entry(entry: &StreamId) -> Result<Delivery, ChannelError> {
        let payload: String = entry.get(EVENT_FIELD).ok_or_else(|| {
            ChannelError::Operation(format!("stream entry {} has no event field", entry.id))
        })?;
        let key: String = entry.get(KEY_FIELD).unwrap_or_default();
        Ok(Delivery {
            delivery_id: entry.id.clone(),
            key,
            event: Self::deserialize(&payload)?,
        })
    }

    async fn ensure_group(
        &self,
        conn: &mut ConnectionManager,
        topic: &str,
        group: &str,
    ) -> Result<(), ChannelError> {
        let cache_key = format!("{topic}:{group}");
        if self
            .known_groups
            .lock()
            .expect("group cache lock")
            .contains(&cache_key)
        {
            return Ok(());
        }

        let created: Result<String, redis::RedisError> =
            conn.xgroup_create_mkstream(topic, group, "0").await;
        match created {
            Ok(_) => {}
            Err(err) if err.to_string().contains("BUSYGROUP") => {}
            Err(err) => return Err(ChannelError::Unavailable(err.to_string())),
        }
        self.known_groups
            .lock()
            .expect("group cache lock")
            .insert(cache_key);
        Ok(())
    }
}

impl EventChannel for RedisEventChannel {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &CaptureEvent,
    ) -> BoxFuture<'_, Result<(), ChannelError>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let payload = Self::serialize(event);
        let mut conn = self.manager.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            let payload = payload?;
            let add = async {
                let _: String = conn
                    .xadd(&topic, "*", &[(KEY_FIELD, &key), (EVENT_FIELD, &payload)])
                    .await
                    .map_err(|err| ChannelError::Unavailable(err.to_string()))?;
                Ok::<(), ChannelError>(())
            };
            timeout(op_timeout, add)
                .await
                .map_err(|_| ChannelError::Unavailable("publish timed out".to_string()))?
        })
    }

    fn receive(
        &self,
        topic: &str,
        group: &str,
        filter: EventFilter,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Delivery>, ChannelError>> {
        let topic = topic.to_string();
        let group = group.to_string();
        let mut conn = self.manager.clone();
        let consumer = self.consumer.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            self.ensure_group(&mut conn, &topic, &group).await?;

            let options = StreamReadOptions::default()
                .group(&group, &consumer)
                .count(1)
                .block(wait.as_millis() as usize);
            let deadline = wait + op_timeout;
            let read = async {
                loop {
                    let reply: StreamReadReply = conn
                        .xread_options(&[&topic], &[">"], &options)
                        .await
                        .map_err(|err| ChannelError::Unavailable(err.to_string()))?;
                    let Some(entry) = reply
                        .keys
                        .into_iter()
                        .flat_map(|stream| stream.ids)
                        .next()
                    else {
                        return Ok(None);
                    };

                    let delivery = Self::parse_entry(&entry)?;
                    if filter.matches(&delivery.event) {
                        return Ok(Some(delivery));
                    }
                    // filtered out: acknowledge and keep draining
                    let _: i64 = conn
                        .xack(&topic, &group, &[&entry.id])
                        .await
                        .map_err(|err| ChannelError::Operation(err.to_string()))?;
                }
            };
            timeout(deadline, read)
                .await
                .map_err(|_| ChannelError::Unavailable("receive timed out".to_string()))?
        })
    }

    fn ack(
        &self,
        topic: &str,
        group: &str,
        delivery_id: &str,
    ) -> BoxFuture<'_, Result<(), ChannelError>> {
        let topic = topic.to_string();
        let group = group.to_string();
        let delivery_id = delivery_id.to_string();
        let mut conn = self.manager.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            let ack = async {
                let _: i64 = conn
                    .xack(&topic, &group, &[&delivery_id])
                    .await
                    .map_err(|err| ChannelError::Operation(err.to_string()))?;
                Ok::<(), ChannelError>(())
            };
            timeout(op_timeout, ack)
                .await
                .map_err(|_| ChannelError::Unavailable("ack timed out".to_string()))?
        })
    }

    fn reclaim(
        &self,
        topic: &str,
        group: &str,
        min_idle: Duration,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Delivery>, ChannelError>> {
        let topic = topic.to_string();
        let group = group.to_string();
        let mut conn = self.manager.clone();
        let consumer = self.consumer.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            self.ensure_group(&mut conn, &topic, &group).await?;

            let claim = async {
                let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
                    .arg(&topic)
                    .arg(&group)
                    .arg(&consumer)
                    .arg(min_idle.as_millis() as u64)
                    .arg("0-0")
                    .arg("COUNT")
                    .arg(limit)
                    .query_async(&mut conn)
                    .await
                    .map_err(|err| ChannelError::Operation(err.to_string()))?;

                let mut reclaimed = Vec::with_capacity(reply.claimed.len());
                for entry in &reply.claimed {
                    match Self::parse_entry(entry) {
                        Ok(delivery) => reclaimed.push(delivery),
                        Err(err) => {
                            // undecodable entry would be reclaimed forever;
                            // ack it away and log
                            tracing::error!(
                                delivery_id = %entry.id,
                                error = %err,
                                "dropping undecodable stream entry"
                            );
                            let _: i64 = conn
                                .xack(&topic, &group, &[&entry.id])
                                .await
                                .map_err(|err| ChannelError::Operation(err.to_string()))?;
                        }
                    }
                }
                Ok(reclaimed)
            };
            timeout(op_timeout, claim)
                .await
                .map_err(|_| ChannelError::Unavailable("reclaim timed out".to_string()))?
        })
    }
}
