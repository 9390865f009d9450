//! HTTP API server.
//!
//! Exposes [`TutorService`] as a JSON API under `/api/v1`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/ingest` | Ingest a course (`{course_id}`) |
//! | `GET` | `/api/v1/knowledge-base/{course_id}` | Knowledge-base summary |
//! | `DELETE` | `/api/v1/knowledge-base/{course_id}` | Clear a course's knowledge |
//! | `POST` | `/api/v1/chat` | Ask a question (`{course_id, question, student_id?}`) |
//! | `GET` | `/api/v1/chat/history/{course_id}/{student_id}` | Chat history (`?limit=`) |
//! | `POST` | `/api/v1/quiz` | Generate a quiz (`{course_id, topic}`) |
//! | `POST` | `/api/v1/quiz/submit` | Record a quiz answer |
//! | `POST` | `/api/v1/learning-path` | Learning path (`{course_id, student_id}`) |
//! | `GET` | `/api/v1/courses` | Courses on the platform |
//! | `GET` | `/api/v1/analytics/{course_id}` | Class analytics |
//! | `GET`/`PUT` | `/api/v1/students/{id}/profile` | Read or update a profile |
//! | `GET`/`POST` | `/api/v1/students/{id}/learning-path-overrides` | Pinned recommendations |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404, unknown route),
//! `upstream_unavailable` (502), `generation_failed` (502),
//! `storage_error` (500), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::analytics::CourseAnalytics;
use crate::config::Config;
use crate::conversation::{ChatMessage, DEFAULT_HISTORY_LIMIT};
use crate::error::TutorError;
use crate::lms::CourseSummary;
use crate::models::{
    IngestReport, KnowledgeSummary, LearningPathResult, QuizSpec, StudentProfile, TutorAnswer,
};
use crate::students::ProfileUpdate;
use crate::tutor::{QuizSubmissionResult, TutorService};

#[derive(Clone)]
struct AppState {
    tutor: Arc<TutorService>,
}

/// Build the router over an existing service.
pub fn router(tutor: Arc<TutorService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/ingest", post(handle_ingest))
        .route(
            "/knowledge-base/{course_id}",
            get(handle_knowledge_base).delete(handle_clear),
        )
        .route("/chat", post(handle_chat))
        .route(
            "/chat/history/{course_id}/{student_id}",
            get(handle_history),
        )
        .route("/quiz", post(handle_quiz))
        .route("/quiz/submit", post(handle_quiz_submit))
        .route("/learning-path", post(handle_learning_path))
        .route("/courses", get(handle_courses))
        .route("/analytics/{course_id}", get(handle_analytics))
        .route(
            "/students/{student_id}/profile",
            get(handle_get_profile).put(handle_update_profile),
        )
        .route(
            "/students/{student_id}/learning-path-overrides",
            get(handle_get_overrides).post(handle_set_overrides),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .with_state(AppState { tutor })
}

/// Build the service from configuration and serve until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let tutor = Arc::new(TutorService::from_config(config).await?);
    let app = router(tutor);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "tutor API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TutorError> for AppError {
    fn from(err: TutorError) -> Self {
        let (status, code) = match &err {
            TutorError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            TutorError::UpstreamFetch(_) => (StatusCode::BAD_GATEWAY, "upstream_unavailable"),
            TutorError::Embedding(_) | TutorError::Generation(_) => {
                (StatusCode::BAD_GATEWAY, "generation_failed")
            }
            TutorError::Storage(_) | TutorError::StudentData(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            TutorError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

async fn handle_not_found(uri: Uri) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: format!("no route for {}", uri.path()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Knowledge base ============

#[derive(Deserialize)]
struct IngestRequest {
    course_id: i64,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestReport> {
    Ok(Json(state.tutor.ingest(req.course_id).await?))
}

async fn handle_knowledge_base(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> ApiResult<KnowledgeSummary> {
    Ok(Json(state.tutor.get_summary(course_id).await?))
}

#[derive(Serialize)]
struct ClearResponse {
    status: &'static str,
    course_id: i64,
    removed: usize,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> ApiResult<ClearResponse> {
    let removed = state.tutor.clear(course_id).await?;
    Ok(Json(ClearResponse {
        status: "cleared",
        course_id,
        removed,
    }))
}

// ============ Tutoring ============

fn default_student_id() -> i64 {
    1
}

#[derive(Deserialize)]
struct ChatRequest {
    course_id: i64,
    question: String,
    #[serde(default = "default_student_id")]
    student_id: i64,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<TutorAnswer> {
    Ok(Json(
        state
            .tutor
            .ask(req.course_id, &req.question, req.student_id)
            .await?,
    ))
}

#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path((course_id, student_id)): Path<(i64, i64)>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<ChatMessage>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.tutor.history(course_id, student_id, limit).await?))
}

#[derive(Deserialize)]
struct QuizRequest {
    course_id: i64,
    topic: String,
}

async fn handle_quiz(
    State(state): State<AppState>,
    Json(req): Json<QuizRequest>,
) -> ApiResult<QuizSpec> {
    Ok(Json(state.tutor.make_quiz(req.course_id, &req.topic).await?))
}

#[derive(Deserialize)]
struct QuizSubmission {
    course_id: i64,
    student_id: i64,
    topic: String,
    is_correct: bool,
}

#[derive(Serialize)]
struct QuizSubmitResponse {
    status: &'static str,
    #[serde(flatten)]
    result: QuizSubmissionResult,
}

async fn handle_quiz_submit(
    State(state): State<AppState>,
    Json(req): Json<QuizSubmission>,
) -> ApiResult<QuizSubmitResponse> {
    let result = state
        .tutor
        .submit_quiz(req.course_id, req.student_id, &req.topic, req.is_correct)
        .await?;
    Ok(Json(QuizSubmitResponse {
        status: "success",
        result,
    }))
}

#[derive(Deserialize)]
struct LearningPathRequest {
    course_id: i64,
    student_id: i64,
}

async fn handle_learning_path(
    State(state): State<AppState>,
    Json(req): Json<LearningPathRequest>,
) -> ApiResult<LearningPathResult> {
    Ok(Json(
        state
            .tutor
            .learning_path(req.course_id, req.student_id)
            .await?,
    ))
}

// ============ Platform and students ============

async fn handle_courses(State(state): State<AppState>) -> ApiResult<Vec<CourseSummary>> {
    Ok(Json(state.tutor.courses().await?))
}

async fn handle_analytics(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> ApiResult<CourseAnalytics> {
    Ok(Json(state.tutor.analytics(course_id).await?))
}

async fn handle_get_profile(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
) -> ApiResult<StudentProfile> {
    Ok(Json(state.tutor.get_profile(student_id).await?))
}

async fn handle_update_profile(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<StudentProfile> {
    Ok(Json(state.tutor.update_profile(student_id, update).await?))
}

#[derive(Deserialize)]
struct OverridesQuery {
    course_id: i64,
}

#[derive(Deserialize)]
struct OverridesUpdate {
    course_id: i64,
    pinned_recommendations: Vec<String>,
}

#[derive(Serialize)]
struct OverridesResponse {
    pinned_recommendations: Vec<String>,
}

async fn handle_get_overrides(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
    Query(query): Query<OverridesQuery>,
) -> ApiResult<OverridesResponse> {
    let pinned_recommendations = state
        .tutor
        .get_overrides(student_id, query.course_id)
        .await?;
    Ok(Json(OverridesResponse {
        pinned_recommendations,
    }))
}

async fn handle_set_overrides(
    State(state): State<AppState>,
    Path(student_id): Path<i64>,
    Json(update): Json<OverridesUpdate>,
) -> ApiResult<OverridesResponse> {
    let pinned_recommendations = state
        .tutor
        .set_overrides(student_id, update.course_id, update.pinned_recommendations)
        .await?;
    Ok(Json(OverridesResponse {
        pinned_recommendations,
    }))
}
