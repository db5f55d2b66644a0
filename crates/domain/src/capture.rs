use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::event::CaptureEvent;
use crate::identity::Submitter;
use crate::model::{AnswerInput, QuestionAnswer, SurveyResult};
use crate::ports::channel::{ChannelError, EventChannel};
use crate::ports::store::{InsertOutcome, ResultStore};
use crate::util::{fingerprint, now_ms};

const MAX_ANSWERS_PER_SUBMISSION: usize = 200;

/// How the deterministic idempotency key for a submission is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionKeyStrategy {
    /// SHA-256 over (survey_id, submitter stable key, submitted_at_ms).
    Fingerprint,
    /// The caller supplies a request id (e.g. the `x-request-id` header).
    ClientRequestId,
}

/// Explicit pipeline configuration: one topic, two named consumer groups.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub topic: String,
    pub store_group: String,
    pub projection_group: String,
    pub key_strategy: SubmissionKeyStrategy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            topic: "survey-results".to_string(),
            store_group: "capture-store".to_string(),
            projection_group: "capture-projection".to_string(),
            key_strategy: SubmissionKeyStrategy::Fingerprint,
        }
    }
}

/// Returned to the caller once the captured event is acknowledged by the
/// channel. The submission is accepted at this point, not yet durable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionAck {
    pub submission_key: String,
    pub submitted_at_ms: i64,
}

/// Result of the store-then-republish step. `replayed` marks a redelivery
/// that converged onto an already-stored submission.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredSubmission {
    pub result: SurveyResult,
    pub answers: Vec<QuestionAnswer>,
    pub replayed: bool,
}

/// Coordinates publish, consume, persist and republish for one submission.
#[derive(Clone)]
pub struct CaptureService {
    store: Arc<dyn ResultStore>,
    channel: Arc<dyn EventChannel>,
    config: CaptureConfig,
}

impl CaptureService {
    pub fn new(
        store: Arc<dyn ResultStore>,
        channel: Arc<dyn EventChannel>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Accepts a whole-survey submission: builds the result and its answers,
    /// publishes the captured envelope keyed by survey id and returns once
    /// the publish is acknowledged. Does not wait for storage.
    pub async fn submit(
        &self,
        submitter: Submitter,
        survey_id: &str,
        inputs: Vec<AnswerInput>,
        request_id: Option<String>,
    ) -> DomainResult<SubmissionAck> {
        let survey_id = validate_submission(survey_id, &inputs)?;
        let submitted_at_ms = now_ms();
        let submission_key = self.submission_key(&survey_id, &submitter, submitted_at_ms, request_id)?;

        let result = SurveyResult {
            id: None,
            survey_id: survey_id.clone(),
            submitter,
            submitted_at_ms,
            submission_key: submission_key.clone(),
        };
        let answers = inputs
            .into_iter()
            .map(QuestionAnswer::from_input)
            .collect::<Vec<_>>();

        let event = CaptureEvent::captured(result, answers);
        self.channel
            .publish(&self.config.topic, &survey_id, &event)
            .await
            .map_err(channel_unavailable)?;

        Ok(SubmissionAck {
            submission_key,
            submitted_at_ms,
        })
    }

    /// The `persisted=false` handler: insert the result (the store assigns
    /// its id exactly once per submission key), stamp and insert the
    /// answers, then republish the stored envelope on the same topic/key.
    ///
    /// Safe to re-run with the same envelope: every insert converges on the
    /// first stored state, and the republished stored envelope is filtered
    /// and keyed so downstream consumers tolerate the repeat.
    pub async fn store_captured(&self, event: CaptureEvent) -> DomainResult<StoredSubmission> {
        let CaptureEvent::Captured { result, answers } = event else {
            return Err(DomainError::Validation(
                "stored envelope delivered to the capture handler".into(),
            ));
        };

        let outcome = self.store.insert_result(&result).await?;
        let replayed = matches!(outcome, InsertOutcome::Existing(_));
        let stored_result = outcome.into_result();
        let result_id = stored_result.id.clone().ok_or_else(|| {
            DomainError::StoreUnavailable("store returned a result without an id".into())
        })?;

        let stamped: Vec<QuestionAnswer> = answers
            .iter()
            .map(|answer| answer.stamped(&result_id, &stored_result.survey_id))
            .collect();
        let stored_answers = self.store.insert_answers(&stamped).await?;

        let stored_event = CaptureEvent::stored(stored_result.clone(), stored_answers.clone());
        self.channel
            .publish(&self.config.topic, &stored_result.survey_id, &stored_event)
            .await
            .map_err(channel_unavailable)?;

        Ok(StoredSubmission {
            result: stored_result,
            answers: stored_answers,
            replayed,
        })
    }

    /// Read-only lookup of all stored answers for one question of one
    /// survey. Returns an empty list when nothing has been stored.
    pub async fn answers_on_question(
        &self,
        survey_id: &str,
        question_id: u32,
    ) -> DomainResult<Vec<QuestionAnswer>> {
        if survey_id.trim().is_empty() {
            return Err(DomainError::Validation("survey_id is required".into()));
        }
        self.store.find_answers(survey_id, question_id).await
    }

    fn submission_key(
        &self,
        survey_id: &str,
        submitter: &Submitter,
        submitted_at_ms: i64,
        request_id: Option<String>,
    ) -> DomainResult<String> {
        match self.config.key_strategy {
            SubmissionKeyStrategy::Fingerprint => {
                fingerprint(&(survey_id, submitter.stable_key(), submitted_at_ms))
            }
            SubmissionKeyStrategy::ClientRequestId => request_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| DomainError::Validation("request_id is required".into())),
        }
    }
}

fn channel_unavailable(err: ChannelError) -> DomainError {
    DomainError::ChannelUnavailable(err.to_string())
}

fn validate_submission(survey_id: &str, inputs: &[AnswerInput]) -> DomainResult<String> {
    let survey_id = survey_id.trim();
    if survey_id.is_empty() {
        return Err(DomainError::Validation("survey_id is required".into()));
    }
    if inputs.is_empty() {
        return Err(DomainError::Validation("answers must not be empty".into()));
    }
    if inputs.len() > MAX_ANSWERS_PER_SUBMISSION {
        return Err(DomainError::Validation(format!(
            "answers exceeds max of {MAX_ANSWERS_PER_SUBMISSION}"
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for input in inputs {
        if input.answer_ids.is_empty() {
            return Err(DomainError::Validation(format!(
                "answer_ids must not be empty for question {}",
                input.question_id
            )));
        }
        if input.answer_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(DomainError::Validation(format!(
                "answer_ids contains a blank id for question {}",
                input.question_id
            )));
        }
        if !seen.insert(input.question_id) {
            return Err(DomainError::Validation(format!(
                "duplicate answer for question {}",
                input.question_id
            )));
        }
    }
    Ok(survey_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Vec<AnswerInput> {
        vec![AnswerInput {
            question_id: 1,
            answer_ids: vec!["A".to_string()],
        }]
    }

    #[test]
    fn validation_rejects_blank_survey_id() {
        let err = validate_submission("  ", &inputs()).unwrap_err();
        assert!(err.to_string().contains("survey_id"));
    }

    #[test]
    fn validation_rejects_empty_answers() {
        let err = validate_submission("S1", &[]).unwrap_err();
        assert!(err.to_string().contains("answers"));
    }

    #[test]
    fn validation_rejects_empty_answer_ids() {
        let err = validate_submission(
            "S1",
            &[AnswerInput {
                question_id: 3,
                answer_ids: vec![],
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("question 3"));
    }

    #[test]
    fn validation_rejects_duplicate_question() {
        let mut answers = inputs();
        answers.push(AnswerInput {
            question_id: 1,
            answer_ids: vec!["B".to_string()],
        });
        let err = validate_submission("S1", &answers).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
