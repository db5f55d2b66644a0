use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use capture_domain::capture::SubmissionAck;
use capture_domain::channel::InMemoryEventChannel;
use capture_domain::event::CaptureEvent;
use capture_domain::model::QuestionAnswer;
use capture_domain::store::InMemoryResultStore;
use capture_infra::config::AppConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        redis_url: "redis://127.0.0.1:6379".to_string(),
        store_prefix: "capture".to_string(),
        capture_topic: "survey-results".to_string(),
        store_group: "capture-store".to_string(),
        projection_group: "capture-projection".to_string(),
        key_strategy: "fingerprint".to_string(),
        publish_timeout_ms: 5_000,
        store_timeout_ms: 5_000,
        channel_block_ms: 10,
        worker_poll_interval_ms: 10,
        reclaim_interval_ms: 100,
        reclaim_idle_ms: 100,
        reclaim_batch: 50,
    }
}

struct TestApp {
    app: Router,
    state: AppState,
    channel: Arc<InMemoryEventChannel>,
    store: Arc<InMemoryResultStore>,
}

fn test_app() -> TestApp {
    let channel = Arc::new(InMemoryEventChannel::new());
    let store = Arc::new(InMemoryResultStore::new());
    let state = AppState::with_components(test_config(), store.clone(), channel.clone())
        .expect("test state");
    let app = routes::router(state.clone());
    TestApp {
        app,
        state,
        channel,
        store,
    }
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_reports_ok() {
    let harness = test_app();
    let response = harness
        .app
        .oneshot(request("GET", "/health", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn capture_accepts_submission_and_publishes_captured_event() {
    let harness = test_app();
    let body = json!({
        "answers": [
            { "question_id": 1, "answer_ids": ["A"] },
            { "question_id": 2, "answer_ids": ["B", "C"] }
        ]
    });

    let response = harness
        .app
        .oneshot(request("POST", "/v1/capture/S1", Some(body)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let ack: SubmissionAck =
        serde_json::from_value(json_body(response).await).expect("submission ack");
    assert!(!ack.submission_key.is_empty());

    let published = harness.channel.published("survey-results");
    assert_eq!(published.len(), 1);
    assert!(matches!(published[0], CaptureEvent::Captured { .. }));
}

#[tokio::test]
async fn capture_rejects_empty_answers_without_publishing() {
    let harness = test_app();
    let response = harness
        .app
        .oneshot(request(
            "POST",
            "/v1/capture/S1",
            Some(json!({ "answers": [] })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(harness.channel.published("survey-results").is_empty());
}

#[tokio::test]
async fn capture_rejects_an_answer_with_no_answer_ids() {
    let harness = test_app();
    let body = json!({
        "answers": [
            { "question_id": 1, "answer_ids": ["A"] },
            { "question_id": 2, "answer_ids": [] }
        ]
    });
    let response = harness
        .app
        .oneshot(request("POST", "/v1/capture/S1", Some(body)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
    let message = body["error"]["message"].as_str().expect("message");
    assert!(message.contains("answers"));
    assert!(harness.channel.published("survey-results").is_empty());
}

#[tokio::test]
async fn answers_round_trip_after_the_store_step_runs() {
    let harness = test_app();
    let body = json!({
        "answers": [
            { "question_id": 1, "answer_ids": ["A"] },
            { "question_id": 2, "answer_ids": ["B", "C"] }
        ]
    });
    let response = harness
        .app
        .clone()
        .oneshot(request("POST", "/v1/capture/S1", Some(body)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let captured = harness.channel.published("survey-results")[0].clone();
    harness
        .state
        .capture
        .store_captured(captured)
        .await
        .expect("store step");
    assert_eq!(harness.store.result_count(), 1);

    let response = harness
        .app
        .oneshot(request(
            "GET",
            "/v1/results/S1/questions/2/answers",
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let answers: Vec<QuestionAnswer> =
        serde_json::from_value(json_body(response).await).expect("answers");
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].question_id, 2);
    assert_eq!(answers[0].answer_ids, vec!["B", "C"]);
    assert!(answers[0].result_id.is_some());
}

#[tokio::test]
async fn answers_query_returns_empty_list_when_nothing_is_stored() {
    let harness = test_app();
    let response = harness
        .app
        .oneshot(request(
            "GET",
            "/v1/results/missing/questions/9/answers",
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}
