use std::sync::Arc;
use std::time::{Duration, Instant};

use capture_domain::capture::CaptureService;
use capture_domain::event::EventFilter;
use capture_domain::ports::channel::{Delivery, EventChannel};
use capture_domain::util::{format_ms_rfc3339, now_ms};
use tracing::{error, info, warn};

use crate::observability;

#[derive(Clone, Debug)]
pub struct WorkerTimings {
    pub block: Duration,
    pub poll_interval: Duration,
    pub reclaim_interval: Duration,
    pub reclaim_idle: Duration,
    pub reclaim_batch: usize,
}

/// Drives the two consumer groups over the capture topic: the store group
/// persists captured envelopes and republishes them as stored, the
/// projection group observes stored envelopes only. Failed deliveries stay
/// un-acked and come back through the reclaim pass.
pub struct WorkerRunner {
    capture: CaptureService,
    channel: Arc<dyn EventChannel>,
    timings: WorkerTimings,
}

impl WorkerRunner {
    pub fn new(
        capture: CaptureService,
        channel: Arc<dyn EventChannel>,
        timings: WorkerTimings,
    ) -> Self {
        Self {
            capture,
            channel,
            timings,
        }
    }

    pub async fn run_store_loop(&self) {
        loop {
            match self.store_pass().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.timings.poll_interval).await,
                Err(err) => {
                    warn!(error = %err, "store consumer receive failed");
                    tokio::time::sleep(self.timings.poll_interval).await;
                }
            }
        }
    }

    pub async fn run_projection_loop(&self) {
        loop {
            match self.projection_pass().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.timings.poll_interval).await,
                Err(err) => {
                    warn!(error = %err, "projection consumer receive failed");
                    tokio::time::sleep(self.timings.poll_interval).await;
                }
            }
        }
    }

    pub async fn run_reclaim_loop(&self) {
        loop {
            tokio::time::sleep(self.timings.reclaim_interval).await;
            if let Err(err) = self.reclaim_pass().await {
                warn!(error = %err, "reclaim pass failed");
            }
        }
    }

    /// One store-group receive. Returns whether a delivery was handled.
    pub async fn store_pass(&self) -> anyhow::Result<bool> {
        let config = self.capture.config().clone();
        let delivery = self
            .channel
            .receive(
                &config.topic,
                &config.store_group,
                EventFilter::CapturedOnly,
                self.timings.block,
            )
            .await?;
        let Some(delivery) = delivery else {
            return Ok(false);
        };
        self.handle_store_delivery(delivery).await;
        Ok(true)
    }

    /// One projection-group receive. Returns whether a delivery was handled.
    pub async fn projection_pass(&self) -> anyhow::Result<bool> {
        let config = self.capture.config().clone();
        let delivery = self
            .channel
            .receive(
                &config.topic,
                &config.projection_group,
                EventFilter::StoredOnly,
                self.timings.block,
            )
            .await?;
        let Some(delivery) = delivery else {
            return Ok(false);
        };
        self.handle_projection_delivery(delivery).await;
        Ok(true)
    }

    /// Re-runs deliveries that were handed out but never acked. Reclaimed
    /// messages are not filtered by the channel, so the subscription filter
    /// is applied again here; non-matching ones are acked away.
    pub async fn reclaim_pass(&self) -> anyhow::Result<usize> {
        let config = self.capture.config().clone();
        let mut handled = 0;

        let reclaimed = self
            .channel
            .reclaim(
                &config.topic,
                &config.store_group,
                self.timings.reclaim_idle,
                self.timings.reclaim_batch,
            )
            .await?;
        for delivery in reclaimed {
            if !EventFilter::CapturedOnly.matches(&delivery.event) {
                self.ack(&config.store_group, &delivery.delivery_id).await;
                continue;
            }
            observability::register_event_reclaimed(&config.store_group);
            self.handle_store_delivery(delivery).await;
            handled += 1;
        }

        let reclaimed = self
            .channel
            .reclaim(
                &config.topic,
                &config.projection_group,
                self.timings.reclaim_idle,
                self.timings.reclaim_batch,
            )
            .await?;
        for delivery in reclaimed {
            if !EventFilter::StoredOnly.matches(&delivery.event) {
                self.ack(&config.projection_group, &delivery.delivery_id)
                    .await;
                continue;
            }
            observability::register_event_reclaimed(&config.projection_group);
            self.handle_projection_delivery(delivery).await;
            handled += 1;
        }

        Ok(handled)
    }

    async fn handle_store_delivery(&self, delivery: Delivery) {
        let group = self.capture.config().store_group.clone();
        let started = Instant::now();
        match self.capture.store_captured(delivery.event).await {
            Ok(stored) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
                let outcome = if stored.replayed { "replayed" } else { "stored" };
                observability::register_event_stored(outcome, duration_ms);
                info!(
                    survey_id = %stored.result.survey_id,
                    submission_key = %stored.result.submission_key,
                    replayed = stored.replayed,
                    "submission stored"
                );
                self.ack(&group, &delivery.delivery_id).await;
            }
            Err(err) => {
                // left un-acked so the reclaim pass redelivers it
                observability::register_event_stored("error", 0.0);
                error!(
                    error = %err,
                    delivery_id = %delivery.delivery_id,
                    "storing captured submission failed"
                );
            }
        }
    }

    async fn handle_projection_delivery(&self, delivery: Delivery) {
        let group = self.capture.config().projection_group.clone();
        let lag_ms = now_ms().saturating_sub(delivery.event.submitted_at_ms());
        observability::register_event_observed(lag_ms);
        info!(
            survey_id = %delivery.event.survey_id(),
            submitted_at = %format_ms_rfc3339(delivery.event.submitted_at_ms()),
            lag_ms,
            "stored submission observed"
        );
        self.ack(&group, &delivery.delivery_id).await;
    }

    async fn ack(&self, group: &str, delivery_id: &str) {
        let topic = &self.capture.config().topic;
        if let Err(err) = self.channel.ack(topic, group, delivery_id).await {
            warn!(error = %err, delivery_id, "ack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use capture_domain::DomainResult;
    use capture_domain::capture::CaptureConfig;
    use capture_domain::channel::InMemoryEventChannel;
    use capture_domain::error::DomainError;
    use capture_domain::identity::Submitter;
    use capture_domain::model::{AnswerInput, QuestionAnswer, SurveyResult};
    use capture_domain::ports::BoxFuture;
    use capture_domain::ports::store::{InsertOutcome, ResultStore};
    use capture_domain::store::InMemoryResultStore;

    fn timings() -> WorkerTimings {
        WorkerTimings {
            block: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            reclaim_interval: Duration::from_millis(10),
            reclaim_idle: Duration::ZERO,
            reclaim_batch: 10,
        }
    }

    fn inputs() -> Vec<AnswerInput> {
        vec![AnswerInput {
            question_id: 1,
            answer_ids: vec!["A".to_string()],
        }]
    }

    struct FailingStore;

    impl ResultStore for FailingStore {
        fn insert_result(
            &self,
            _result: &SurveyResult,
        ) -> BoxFuture<'_, DomainResult<InsertOutcome>> {
            Box::pin(async { Err(DomainError::StoreUnavailable("store down".into())) })
        }

        fn insert_answers(
            &self,
            _answers: &[QuestionAnswer],
        ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
            Box::pin(async { Err(DomainError::StoreUnavailable("store down".into())) })
        }

        fn find_answers(
            &self,
            _survey_id: &str,
            _question_id: u32,
        ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
            Box::pin(async { Err(DomainError::StoreUnavailable("store down".into())) })
        }
    }

    #[tokio::test]
    async fn store_pass_persists_and_acks_a_captured_event() {
        let channel = Arc::new(InMemoryEventChannel::new());
        let store = Arc::new(InMemoryResultStore::new());
        let capture =
            CaptureService::new(store.clone(), channel.clone(), CaptureConfig::default());
        let runner = WorkerRunner::new(capture.clone(), channel.clone(), timings());

        capture
            .submit(Submitter::anonymous("10.0.0.1").unwrap(), "S1", inputs(), None)
            .await
            .unwrap();

        assert!(runner.store_pass().await.unwrap());
        assert_eq!(store.result_count(), 1);
        assert_eq!(channel.pending_count("survey-results", "capture-store"), 0);
        assert_eq!(channel.published("survey-results").len(), 2);

        assert!(runner.projection_pass().await.unwrap());
        assert_eq!(
            channel.pending_count("survey-results", "capture-projection"),
            0
        );
    }

    #[tokio::test]
    async fn failed_store_leaves_delivery_pending_for_reclaim() {
        let channel = Arc::new(InMemoryEventChannel::new());
        let capture = CaptureService::new(
            Arc::new(FailingStore),
            channel.clone(),
            CaptureConfig::default(),
        );
        let runner = WorkerRunner::new(capture.clone(), channel.clone(), timings());

        capture
            .submit(Submitter::anonymous("10.0.0.1").unwrap(), "S1", inputs(), None)
            .await
            .unwrap();

        assert!(runner.store_pass().await.unwrap());
        assert_eq!(channel.pending_count("survey-results", "capture-store"), 1);

        let reclaimed = channel
            .reclaim("survey-results", "capture-store", Duration::ZERO, 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert!(EventFilter::CapturedOnly.matches(&reclaimed[0].event));
    }

    #[tokio::test]
    async fn reclaim_pass_replays_a_stalled_store_delivery() {
        let channel = Arc::new(InMemoryEventChannel::new());
        let store = Arc::new(InMemoryResultStore::new());
        let capture =
            CaptureService::new(store.clone(), channel.clone(), CaptureConfig::default());
        let runner = WorkerRunner::new(capture.clone(), channel.clone(), timings());

        capture
            .submit(Submitter::anonymous("10.0.0.1").unwrap(), "S1", inputs(), None)
            .await
            .unwrap();

        // hand the delivery out without acking, as a crashed consumer would
        let delivery = channel
            .receive(
                "survey-results",
                "capture-store",
                EventFilter::CapturedOnly,
                Duration::ZERO,
            )
            .await
            .unwrap();
        assert!(delivery.is_some());

        let handled = runner.reclaim_pass().await.unwrap();
        assert_eq!(handled, 1);
        assert_eq!(store.result_count(), 1);
        assert_eq!(channel.pending_count("survey-results", "capture-store"), 0);
    }
}
