//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use course_tutor::config::ChunkingConfig;
use course_tutor::conversation::ConversationStore;
use course_tutor::embedding::HashedEmbedder;
use course_tutor::generation::Generator;
use course_tutor::index::KnowledgeIndex;
use course_tutor::lms::MockContentSource;
use course_tutor::server::router;
use course_tutor::store::InMemoryStore;
use course_tutor::students::SqliteStudentStore;
use course_tutor::tutor::{TutorDeps, TutorService};
use course_tutor::{db, migrate};

struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        if prompt.contains("Output Format:") {
            Ok("not json".to_string())
        } else {
            Ok("An answer.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

async fn app() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect_path(&tmp.path().join("tutor.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let mock = Arc::new(MockContentSource);
    let tutor = TutorService::new(TutorDeps {
        content: mock.clone(),
        grades: mock.clone(),
        index: Arc::new(KnowledgeIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashedEmbedder::new(64)),
            16,
        )),
        generator: Arc::new(EchoGenerator),
        students: Arc::new(SqliteStudentStore::new(pool.clone(), Some(mock))),
        conversations: Some(Arc::new(ConversationStore::new(pool))),
        chunking: ChunkingConfig::default(),
    });
    (tmp, router(Arc::new(tutor)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_version() {
    let (_tmp, app) = app().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn ingest_then_summary_then_clear() {
    let (_tmp, app) = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/ingest",
        Some(serde_json::json!({"course_id": 101})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(body["chunk_count"].as_u64().unwrap() >= 2);

    let (status, body) = send(&app, "GET", "/api/v1/knowledge-base/101", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"][0]["name"], "What is AI?");
    assert_eq!(body["sources"][0]["type"], "page");
    assert_eq!(body["sources"][0]["section"], "Week 1: Basics");

    let (status, body) = send(&app, "DELETE", "/api/v1/knowledge-base/101", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleared");

    let (_, body) = send(&app, "GET", "/api/v1/knowledge-base/101", None).await;
    assert_eq!(body["document_count"], 0);
}

#[tokio::test]
async fn chat_returns_sources_and_history() {
    let (_tmp, app) = app().await;
    send(&app, "POST", "/api/v1/ingest", Some(serde_json::json!({"course_id": 101}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/chat",
        Some(serde_json::json!({"course_id": 101, "question": "What is AI?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "An answer.");
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert!(sources.iter().all(|s| s["course_id"] == 101));

    let (status, body) = send(&app, "GET", "/api/v1/chat/history/101/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[1]["role"], "assistant");
}

#[tokio::test]
async fn empty_question_is_bad_request() {
    let (_tmp, app) = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/chat",
        Some(serde_json::json!({"course_id": 101, "question": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn malformed_quiz_output_returns_fallback() {
    let (_tmp, app) = app().await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/quiz",
        Some(serde_json::json!({"course_id": 101, "topic": "Neural Networks"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["options"], serde_json::json!(["Error"]));
    assert_eq!(body["correct_answer"], "Error");
}

#[tokio::test]
async fn quiz_submission_drives_learning_path() {
    let (_tmp, app) = app().await;

    let (_, body) = send(
        &app,
        "POST",
        "/api/v1/learning-path",
        Some(serde_json::json!({"course_id": 101, "student_id": 2})),
    )
    .await;
    assert_eq!(body["status"], "start");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/quiz/submit",
        Some(serde_json::json!({"course_id": 101, "student_id": 2, "topic": "Search", "is_correct": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["quiz_name"], "Search Quiz");

    let (_, body) = send(
        &app,
        "POST",
        "/api/v1/learning-path",
        Some(serde_json::json!({"course_id": 101, "student_id": 2})),
    )
    .await;
    assert_eq!(body["status"], "needs_improvement");
    assert_eq!(body["weaknesses"], serde_json::json!(["Search"]));
}

#[tokio::test]
async fn profile_and_overrides_round_trip() {
    let (_tmp, app) = app().await;

    let (status, body) = send(
        &app,
        "PUT",
        "/api/v1/students/3/profile",
        Some(serde_json::json!({"learning_style": "Visual", "strengths": ["Logic"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["learning_style"], "Visual");
    assert_eq!(body["name"], "Mock Student 3");

    let (_, body) = send(&app, "GET", "/api/v1/students/3/profile", None).await;
    assert_eq!(body["strengths"], serde_json::json!(["Logic"]));

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/students/3/learning-path-overrides",
        Some(serde_json::json!({"course_id": 101, "pinned_recommendations": ["Rewatch lecture"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(
        &app,
        "GET",
        "/api/v1/students/3/learning-path-overrides?course_id=101",
        None,
    )
    .await;
    assert_eq!(
        body["pinned_recommendations"],
        serde_json::json!(["Rewatch lecture"])
    );
}

#[tokio::test]
async fn courses_and_analytics() {
    let (_tmp, app) = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/courses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(&app, "GET", "/api/v1/analytics/101", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_students"], 2);
    assert_eq!(body["students"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_route_uses_error_contract() {
    let (_tmp, app) = app().await;
    let (status, body) = send(&app, "GET", "/api/v1/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}
