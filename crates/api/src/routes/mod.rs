use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use capture_domain::capture::SubmissionAck;
use capture_domain::identity::Submitter;
use capture_domain::model::{AnswerInput, QuestionAnswer};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::ApiError, middleware as app_middleware, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/capture/:survey_id", post(capture_submission))
        .route(
            "/v1/results/:survey_id/questions/:question_id/answers",
            get(answers_on_question),
        )
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

// Serialize is load-bearing: validator embeds the offending value in its
// length-check params.
#[derive(Debug, Deserialize, Serialize, Validate)]
struct AnswerDto {
    question_id: u32,
    #[validate(length(min = 1))]
    answer_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct CaptureRequest {
    #[validate(length(min = 1), nested)]
    answers: Vec<AnswerDto>,
}

impl From<AnswerDto> for AnswerInput {
    fn from(dto: AnswerDto) -> Self {
        AnswerInput {
            question_id: dto.question_id,
            answer_ids: dto.answer_ids,
        }
    }
}

async fn capture_submission(
    State(state): State<AppState>,
    Path(survey_id): Path<String>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<CaptureRequest>,
) -> Result<(StatusCode, Json<SubmissionAck>), ApiError> {
    validation::validate(&payload)?;

    let submitter = Submitter::anonymous(remote.ip().to_string())?;
    let request_id = request_id_from_headers(&headers);
    let inputs = payload.answers.into_iter().map(AnswerInput::from).collect();

    let ack = state
        .capture
        .submit(submitter, &survey_id, inputs, request_id)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn answers_on_question(
    State(state): State<AppState>,
    Path((survey_id, question_id)): Path<(String, u32)>,
) -> Result<Json<Vec<QuestionAnswer>>, ApiError> {
    let answers = state
        .capture
        .answers_on_question(&survey_id, question_id)
        .await?;
    Ok(Json(answers))
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(std::string::ToString::to_string)
}
