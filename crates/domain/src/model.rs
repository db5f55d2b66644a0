use serde::{Deserialize, Serialize};

use crate::identity::Submitter;

/// One question's answers as submitted by the client, before the pipeline
/// gives it any identity of its own.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerInput {
    pub question_id: u32,
    pub answer_ids: Vec<String>,
}

/// One user's answer to one question. `result_id` and `answer_id` stay unset
/// until the store step stamps them; after that the record is never mutated.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    pub survey_id: String,
    pub question_id: u32,
    pub answer_ids: Vec<String>,
}

impl QuestionAnswer {
    pub fn from_input(input: AnswerInput) -> Self {
        Self {
            answer_id: None,
            result_id: None,
            survey_id: String::new(),
            question_id: input.question_id,
            answer_ids: input.answer_ids,
        }
    }

    /// The store-step stamp: links the answer to its stored result and takes
    /// the survey id from the result so the two can never disagree.
    pub fn stamped(&self, result_id: &str, survey_id: &str) -> Self {
        Self {
            answer_id: self.answer_id.clone(),
            result_id: Some(result_id.to_string()),
            survey_id: survey_id.to_string(),
            question_id: self.question_id,
            answer_ids: self.answer_ids.clone(),
        }
    }

    pub fn is_stamped_with(&self, result_id: &str) -> bool {
        self.result_id.as_deref() == Some(result_id)
    }
}

/// The aggregate survey submission. `id` is assigned by the store on insert;
/// `submitted_at_ms` is assigned once, at submit time, so capture-to-store
/// latency stays measurable downstream. `submission_key` is the deterministic
/// idempotency key that collapses redeliveries onto one stored record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SurveyResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub survey_id: String,
    pub submitter: Submitter,
    pub submitted_at_ms: i64,
    pub submission_key: String,
}

impl SurveyResult {
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        let mut result = self.clone();
        result.id = Some(id.into());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> AnswerInput {
        AnswerInput {
            question_id: 2,
            answer_ids: vec!["B".to_string(), "C".to_string()],
        }
    }

    #[test]
    fn from_input_carries_no_identity() {
        let answer = QuestionAnswer::from_input(input());
        assert_eq!(answer.answer_id, None);
        assert_eq!(answer.result_id, None);
        assert_eq!(answer.question_id, 2);
        assert_eq!(answer.answer_ids, vec!["B", "C"]);
    }

    #[test]
    fn stamped_links_result_and_survey() {
        let answer = QuestionAnswer::from_input(input());
        let stamped = answer.stamped("res-1", "S1");
        assert!(stamped.is_stamped_with("res-1"));
        assert_eq!(stamped.survey_id, "S1");
        assert_eq!(stamped.answer_ids, answer.answer_ids);
    }

    #[test]
    fn with_id_leaves_original_untouched() {
        let result = SurveyResult {
            id: None,
            survey_id: "S1".to_string(),
            submitter: Submitter::anonymous("10.0.0.7").unwrap(),
            submitted_at_ms: 1,
            submission_key: "key".to_string(),
        };
        let stored = result.with_id("res-1");
        assert_eq!(stored.id.as_deref(), Some("res-1"));
        assert_eq!(result.id, None);
    }
}
