use serde::{Deserialize, Serialize};

use crate::model::{QuestionAnswer, SurveyResult};

/// The envelope that crosses the channel. The two phases of a submission are
/// distinct variants rather than a runtime flag, so each subscription's
/// predicate is checked against the type, not a boolean.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum CaptureEvent {
    /// Published by `submit`; the result has no id yet.
    Captured {
        result: SurveyResult,
        answers: Vec<QuestionAnswer>,
    },
    /// Republished after the store step; the result carries its assigned id
    /// and every answer is stamped with it.
    Stored {
        result: SurveyResult,
        answers: Vec<QuestionAnswer>,
    },
}

impl CaptureEvent {
    pub fn captured(result: SurveyResult, answers: Vec<QuestionAnswer>) -> Self {
        Self::Captured { result, answers }
    }

    pub fn stored(result: SurveyResult, answers: Vec<QuestionAnswer>) -> Self {
        Self::Stored { result, answers }
    }

    pub fn survey_id(&self) -> &str {
        match self {
            Self::Captured { result, .. } | Self::Stored { result, .. } => &result.survey_id,
        }
    }

    pub fn submitted_at_ms(&self) -> i64 {
        match self {
            Self::Captured { result, .. } | Self::Stored { result, .. } => result.submitted_at_ms,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Subscription predicate for one of the two logical consumers sharing the
/// topic. Evaluated before dispatch; non-matching messages are acked and
/// skipped without invoking the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventFilter {
    CapturedOnly,
    StoredOnly,
}

impl EventFilter {
    pub fn matches(&self, event: &CaptureEvent) -> bool {
        match self {
            Self::CapturedOnly => !event.is_stored(),
            Self::StoredOnly => event.is_stored(),
        }
    }
}

/// The boolean-flagged shape the envelope takes on the wire:
/// `{ result, answers, persisted }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub result: SurveyResult,
    pub answers: Vec<QuestionAnswer>,
    pub persisted: bool,
}

impl From<CaptureEvent> for WireEnvelope {
    fn from(event: CaptureEvent) -> Self {
        match event {
            CaptureEvent::Captured { result, answers } => Self {
                result,
                answers,
                persisted: false,
            },
            CaptureEvent::Stored { result, answers } => Self {
                result,
                answers,
                persisted: true,
            },
        }
    }
}

impl TryFrom<WireEnvelope> for CaptureEvent {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        if !wire.persisted {
            return Ok(Self::Captured {
                result: wire.result,
                answers: wire.answers,
            });
        }

        let id = wire
            .result
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "persisted envelope carries a result without id".to_string())?;
        if let Some(answer) = wire.answers.iter().find(|answer| !answer.is_stamped_with(id)) {
            return Err(format!(
                "persisted envelope carries answer for question {} not stamped with result id {id}",
                answer.question_id
            ));
        }
        Ok(Self::Stored {
            result: wire.result,
            answers: wire.answers,
        })
    }
}
