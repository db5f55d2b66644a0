use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::event::{CaptureEvent, EventFilter};
use crate::ports::BoxFuture;
use crate::ports::channel::{ChannelError, Delivery, EventChannel};

/// In-memory single-partition log with consumer groups, used by tests and
/// the `memory` backend. Publish order is delivery order, which satisfies
/// the per-key ordering contract trivially.
#[derive(Clone, Default)]
pub struct InMemoryEventChannel {
    inner: Arc<Mutex<HashMap<String, TopicState>>>,
}

#[derive(Default)]
struct TopicState {
    entries: Vec<Entry>,
    groups: HashMap<String, GroupState>,
}

struct Entry {
    key: String,
    event: CaptureEvent,
}

#[derive(Default)]
struct GroupState {
    cursor: usize,
    // delivery_id -> time the delivery was handed out
    pending: HashMap<String, Instant>,
}

impl InMemoryEventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, in publish order. Test hook.
    pub fn published(&self, topic: &str) -> Vec<CaptureEvent> {
        let inner = self.inner.lock().expect("channel lock");
        inner
            .get(topic)
            .map(|state| state.entries.iter().map(|entry| entry.event.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pending_count(&self, topic: &str, group: &str) -> usize {
        let inner = self.inner.lock().expect("channel lock");
        inner
            .get(topic)
            .and_then(|state| state.groups.get(group))
            .map(|group| group.pending.len())
            .unwrap_or(0)
    }
}

impl EventChannel for InMemoryEventChannel {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &CaptureEvent,
    ) -> BoxFuture<'_, Result<(), ChannelError>> {
        let topic = topic.to_string();
        let key = key.to_string();
        let event = event.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("channel lock");
            inner
                .entry(topic)
                .or_default()
                .entries
                .push(Entry { key, event });
            Ok(())
        })
    }

    fn receive(
        &self,
        topic: &str,
        group: &str,
        filter: EventFilter,
        _wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Delivery>, ChannelError>> {
        let topic = topic.to_string();
        let group = group.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("channel lock");
            let state = inner.entry(topic).or_default();
            loop {
                let cursor = state.groups.entry(group.clone()).or_default().cursor;
                let Some(entry) = state.entries.get(cursor) else {
                    return Ok(None);
                };
                let delivery_id = cursor.to_string();
                let group_state = state.groups.entry(group.clone()).or_default();
                group_state.cursor += 1;
                if !filter.matches(&entry.event) {
                    // acked and skipped without reaching the handler
                    continue;
                }
                group_state.pending.insert(delivery_id.clone(), Instant::now());
                return Ok(Some(Delivery {
                    delivery_id,
                    key: entry.key.clone(),
                    event: entry.event.clone(),
                }));
            }
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
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("channel lock");
            if let Some(group_state) = inner
                .get_mut(&topic)
                .and_then(|state| state.groups.get_mut(&group))
            {
                group_state.pending.remove(&delivery_id);
            }
            Ok(())
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
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut inner = inner.lock().expect("channel lock");
            let Some(state) = inner.get_mut(&topic) else {
                return Ok(Vec::new());
            };
            let Some(group_state) = state.groups.get_mut(&group) else {
                return Ok(Vec::new());
            };
            let now = Instant::now();
            let mut stale: Vec<usize> = group_state
                .pending
                .iter()
                .filter(|(_, handed_out)| now.duration_since(**handed_out) >= min_idle)
                .filter_map(|(id, _)| id.parse().ok())
                .collect();
            stale.sort_unstable();
            stale.truncate(limit);

            let mut reclaimed = Vec::with_capacity(stale.len());
            for position in stale {
                let Some(entry) = state.entries.get(position) else {
                    continue;
                };
                let delivery_id = position.to_string();
                group_state.pending.insert(delivery_id.clone(), now);
                reclaimed.push(Delivery {
                    delivery_id,
                    key: entry.key.clone(),
                    event: entry.event.clone(),
                });
            }
            Ok(reclaimed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Submitter;
    use crate::model::SurveyResult;

    fn captured(survey_id: &str) -> CaptureEvent {
        CaptureEvent::captured(
            SurveyResult {
                id: None,
                survey_id: survey_id.to_string(),
                submitter: Submitter::anonymous("10.0.0.7").unwrap(),
                submitted_at_ms: 1,
                submission_key: format!("key-{survey_id}"),
            },
            vec![],
        )
    }

    #[tokio::test]
    async fn receive_skips_filtered_events() {
        let channel = InMemoryEventChannel::new();
        let event = captured("S1");
        channel.publish("t", "S1", &event).await.unwrap();

        let none = channel
            .receive("t", "g", EventFilter::StoredOnly, Duration::ZERO)
            .await
            .unwrap();
        assert!(none.is_none());
        // the skipped message was consumed, not left blocking the group
        let none = channel
            .receive("t", "g", EventFilter::StoredOnly, Duration::ZERO)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn unacked_delivery_is_reclaimable() {
        let channel = InMemoryEventChannel::new();
        channel.publish("t", "S1", &captured("S1")).await.unwrap();

        let delivery = channel
            .receive("t", "g", EventFilter::CapturedOnly, Duration::ZERO)
            .await
            .unwrap()
            .expect("delivery");

        let reclaimed = channel
            .reclaim("t", "g", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(reclaimed, vec![delivery.clone()]);

        channel.ack("t", "g", &delivery.delivery_id).await.unwrap();
        let reclaimed = channel
            .reclaim("t", "g", Duration::ZERO, 10)
            .await
            .unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn groups_consume_independently() {
        let channel = InMemoryEventChannel::new();
        channel.publish("t", "S1", &captured("S1")).await.unwrap();

        let first = channel
            .receive("t", "g1", EventFilter::CapturedOnly, Duration::ZERO)
            .await
            .unwrap();
        let second = channel
            .receive("t", "g2", EventFilter::CapturedOnly, Duration::ZERO)
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
    }
}
