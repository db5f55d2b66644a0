use super::BoxFuture;
use crate::DomainResult;
use crate::model::{QuestionAnswer, SurveyResult};

/// Outcome of the put-if-absent result insert. `Existing` means the
/// submission key was already stored; the returned record carries the id
/// assigned by the first insert.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    Inserted(SurveyResult),
    Existing(SurveyResult),
}

impl InsertOutcome {
    pub fn into_result(self) -> SurveyResult {
        match self {
            Self::Inserted(result) | Self::Existing(result) => result,
        }
    }
}

/// Append-only document store for results and answers. Inserts are keyed
/// deterministically (submission key for results, result id + question id
/// for answers) so redelivered events converge instead of duplicating.
pub trait ResultStore: Send + Sync {
    fn insert_result(&self, result: &SurveyResult) -> BoxFuture<'_, DomainResult<InsertOutcome>>;

    /// Idempotent bulk insert. An answer whose (result_id, question_id) pair
    /// already exists with the same content is returned as stored; the same
    /// pair with different content is a duplicate-submission error.
    fn insert_answers(
        &self,
        answers: &[QuestionAnswer],
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>>;

    fn find_answers(
        &self,
        survey_id: &str,
        question_id: u32,
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>>;
}
