use std::time::Duration;

use capture_domain::DomainResult;
use capture_domain::error::DomainError;
use capture_domain::model::{QuestionAnswer, SurveyResult};
use capture_domain::ports::BoxFuture;
use capture_domain::ports::store::{InsertOutcome, ResultStore};
use capture_domain::util::uuid_v7_without_dashes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::time::timeout;

/// Document store for results and answers on Redis. Results live under
/// `{prefix}:results:{submission_key}`, answers in a hash per result id with
/// an insertion-ordered index list per (survey, question) for lookups.
/// Inserts are Lua-scripted put-if-absent so concurrent redeliveries race
/// safely.
#[derive(Clone)]
pub struct RedisResultStore {
    manager: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
}

impl RedisResultStore {
    pub async fn connect(
        redis_url: &str,
        prefix: impl Into<String>,
        op_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let client = redis::Client::open(redis_url)
            .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;
        Ok(Self {
            manager,
            prefix: prefix.into(),
            op_timeout,
        })
    }

    fn result_key(&self, submission_key: &str) -> String {
        format!("{}:results:{submission_key}", self.prefix)
    }

    fn answers_key(&self, result_id: &str) -> String {
        format!("{}:answers:{result_id}", self.prefix)
    }

    fn index_key(&self, survey_id: &str, question_id: u32) -> String {
        format!("{}:answers:index:{survey_id}:{question_id}", self.prefix)
    }

    fn serialize<T: serde::Serialize>(value: &T) -> DomainResult<String> {
        serde_json::to_string(value)
            .map_err(|err| DomainError::StoreUnavailable(format!("serialization failed: {err}")))
    }

    fn deserialize<T: serde::de::DeserializeOwned>(payload: &str) -> DomainResult<T> {
        serde_json::from_str(payload)
            .map_err(|err| DomainError::StoreUnavailable(format!("corrupt document: {err}")))
    }
}

impl ResultStore for RedisResultStore {
    fn insert_result(&self, result: &SurveyResult) -> BoxFuture<'_, DomainResult<InsertOutcome>> {
        let result = result.clone();
        let result_key = self.result_key(&result.submission_key);
        let mut conn = self.manager.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            let stored = result.with_id(uuid_v7_without_dashes());
            let payload = Self::serialize(&stored)?;

            let script = redis::Script::new(
                r#"
                    local existing = redis.call('GET', KEYS[1])
                    if existing then
                        return existing
                    end
                    redis.call('SET', KEYS[1], ARGV[1])
                    return false
                "#,
            );
            let insert = async {
                let existing: Option<String> = script
                    .key(&result_key)
                    .arg(&payload)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;
                Ok::<Option<String>, DomainError>(existing)
            };
            let existing = timeout(op_timeout, insert)
                .await
                .map_err(|_| DomainError::StoreUnavailable("result insert timed out".into()))??;

            match existing {
                Some(payload) => Ok(InsertOutcome::Existing(Self::deserialize(&payload)?)),
                None => Ok(InsertOutcome::Inserted(stored)),
            }
        })
    }

    fn insert_answers(
        &self,
        answers: &[QuestionAnswer],
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
        let answers = answers.to_vec();
        let mut conn = self.manager.clone();
        let op_timeout = self.op_timeout;
        Box::pin(async move {
            let script = redis::Script::new(
                r#"
                    local existing = redis.call('HGET', KEYS[1], ARGV[1])
                    if existing then
                        return existing
                    end
                    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
                    redis.call('RPUSH', KEYS[2], ARGV[3])
                    return false
                "#,
            );

            let mut stored = Vec::with_capacity(answers.len());
            for answer in answers {
                let result_id = answer.result_id.clone().ok_or_else(|| {
                    DomainError::Validation(format!(
                        "answer for question {} has no result_id",
                        answer.question_id
                    ))
                })?;
                let mut record = answer.clone();
                record.answer_id = Some(uuid_v7_without_dashes());
                let payload = Self::serialize(&record)?;

                let answers_key = self.answers_key(&result_id);
                let index_key = self.index_key(&record.survey_id, record.question_id);
                let insert = async {
                    let existing: Option<String> = script
                        .key(&answers_key)
                        .key(&index_key)
                        .arg(record.question_id)
                        .arg(&payload)
                        .arg(&result_id)
                        .invoke_async(&mut conn)
                        .await
                        .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;
                    Ok::<Option<String>, DomainError>(existing)
                };
                let existing = timeout(op_timeout, insert).await.map_err(|_| {
                    DomainError::StoreUnavailable("answer insert timed out".into())
                })??;

                match existing {
                    Some(payload) => {
                        let existing: QuestionAnswer = Self::deserialize(&payload)?;
                        if existing.answer_ids != record.answer_ids {
                            return Err(DomainError::DuplicateSubmission(format!(
                                "conflicting answers for question {} of result {result_id}",
                                record.question_id
                            )));
                        }
                        stored.push(existing);
                    }
                    None => stored.push(record),
                }
            }
            Ok(stored)
        })
    }

    fn find_answers(
        &self,
        survey_id: &str,
        question_id: u32,
    ) -> BoxFuture<'_, DomainResult<Vec<QuestionAnswer>>> {
        let index_key = self.index_key(survey_id, question_id);
        let mut conn = self.manager.clone();
        let op_timeout = self.op_timeout;
        let answers_prefix = format!("{}:answers:", self.prefix);
        Box::pin(async move {
            let lookup = async {
                let result_ids: Vec<String> = conn
                    .lrange(&index_key, 0, -1)
                    .await
                    .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;

                let mut answers = Vec::with_capacity(result_ids.len());
                for result_id in result_ids {
                    let payload: Option<String> = conn
                        .hget(format!("{answers_prefix}{result_id}"), question_id)
                        .await
                        .map_err(|err| DomainError::StoreUnavailable(err.to_string()))?;
                    if let Some(payload) = payload {
                        answers.push(Self::deserialize::<QuestionAnswer>(&payload)?);
                    }
                }
                Ok(answers)
            };
            timeout(op_timeout, lookup)
                .await
                .map_err(|_| DomainError::StoreUnavailable("answer lookup timed out".into()))?
        })
    }
}
