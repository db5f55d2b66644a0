use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::DomainResult;
use crate::error::DomainError;
use crate::model::{QuestionAnswer, SurveyResult};
use crate::ports::BoxFuture;
use crate::ports::store::{InsertOutcome, ResultStore};
use crate::util::uuid_v7_without_dashes;

/// In-memory document store, used by tests and the `memory` backend.
#[derive(Clone, Default)]
pub struct InMemoryResultStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    // submission_key -> stored result
    results: HashMap<String, SurveyResult>,
    // insertion-ordered answers, indexed by (result_id, question_id)
    answers: Vec<QuestionAnswer>,
    answer_index: HashMap<(String, u32), usize>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result_count(&self) -> usize {
        self.inner.lock().expect("result store lock").results.len()
    }

    pub fn answer_count(&self) -> usize {
        self.inner.lock().expect("result store lock").answers.len()
    }
}

impl ResultStore for InMemoryResultStore {
    fn insert_result(&self, result: &SurveyResult) -> BoxFuture<'_, DomainResult<InsertOutcome>> {
        let result = result.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().expect("result store lock");
            if let Some(existing) = state.results.get(&result.submission_key) {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
            let stored = result.with_id(uuid_v7_without_dashes());
            state
                .results
                .insert(stored.submission_key.clone(), stored.clone());
            Ok(InsertOutcome::Inserted(stored))
        })
    }

    fn insert_answers(
        &self,
        answers: &[QuestionAnswer],
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
        let answers = answers.to_vec();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut state = inner.lock().expect("result store lock");
            let mut stored = Vec::with_capacity(answers.len());
            for answer in answers {
                let result_id = answer.result_id.clone().ok_or_else(|| {
                    DomainError::Validation(format!(
                        "answer for question {} has no result_id",
                        answer.question_id
                    ))
                })?;
                let index_key = (result_id, answer.question_id);
                if let Some(&position) = state.answer_index.get(&index_key) {
                    let existing = &state.answers[position];
                    if existing.answer_ids != answer.answer_ids {
                        return Err(DomainError::DuplicateSubmission(format!(
                            "conflicting answers for question {} of result {}",
                            answer.question_id, index_key.0
                        )));
                    }
                    stored.push(existing.clone());
                    continue;
                }
                let mut record = answer.clone();
                record.answer_id = Some(uuid_v7_without_dashes());
                let position = state.answers.len();
                state.answer_index.insert(index_key, position);
                state.answers.push(record.clone());
                stored.push(record);
            }
            Ok(stored)
        })
    }

    fn find_answers(
        &self,
        survey_id: &str,
        question_id: u32,
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
        let survey_id = survey_id.to_string();
        let inner = self.inner.clone();
        Box::pin(async move {
            let state = inner.lock().expect("result store lock");
            Ok(state
                .answers
                .iter()
                .filter(|answer| answer.survey_id == survey_id && answer.question_id == question_id)
                .cloned()
                .collect())
        })
    }
}
