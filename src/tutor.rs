//! The tutoring service: every operation the CLI and HTTP layer expose.
//!
//! [`TutorService`] holds explicitly constructed collaborators; nothing is
//! process-global. [`TutorService::from_config`] wires the production set
//! (SQLite, configured providers, LMS client); tests pass their own
//! [`TutorDeps`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::{self, CourseAnalytics};
use crate::config::{ChunkingConfig, Config};
use crate::conversation::{ChatMessage, ChatRole, ConversationStore};
use crate::embedding::create_embedder;
use crate::error::{Result, TutorError};
use crate::generation::{create_generator, Generator};
use crate::index::KnowledgeIndex;
use crate::ingest;
use crate::lms::{create_lms, ContentSource, CourseSummary, GradeSource};
use crate::models::{
    IngestReport, KnowledgeSummary, LearningPathResult, QuizSpec, StudentContext, StudentProfile,
    TutorAnswer,
};
use crate::planner;
use crate::prompts::tutoring_prompt;
use crate::quiz::{parse_quiz_response, quiz_prompt};
use crate::retrieve::{retrieve, QA_TOP_K, QUIZ_TOP_K};
use crate::store::SqliteStore;
use crate::students::{ProfileUpdate, SqliteStudentStore, StudentStore};
use crate::{db, migrate};

/// Collaborators of a [`TutorService`].
pub struct TutorDeps {
    pub content: Arc<dyn ContentSource>,
    pub grades: Arc<dyn GradeSource>,
    pub index: Arc<KnowledgeIndex>,
    pub generator: Arc<dyn Generator>,
    pub students: Arc<dyn StudentStore>,
    pub conversations: Option<Arc<ConversationStore>>,
    pub chunking: ChunkingConfig,
}

/// Result of recording a tutor-generated quiz answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmissionResult {
    pub quiz_name: String,
    pub score: f64,
}

pub struct TutorService {
    deps: TutorDeps,
}

impl TutorService {
    pub fn new(deps: TutorDeps) -> Self {
        Self { deps }
    }

    /// Connect the database, run migrations, and build every collaborator
    /// from configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let lms = create_lms(&config.lms)?;
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        info!(
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            "tutor service ready"
        );

        let index = KnowledgeIndex::new(
            Arc::new(SqliteStore::new(pool.clone())),
            embedder,
            config.embedding.batch_size,
        );

        Ok(Self::new(TutorDeps {
            content: lms.content,
            grades: lms.grades.clone(),
            index: Arc::new(index),
            generator,
            students: Arc::new(SqliteStudentStore::new(pool.clone(), Some(lms.grades))),
            conversations: Some(Arc::new(ConversationStore::new(pool))),
            chunking: config.chunking.clone(),
        }))
    }

    pub fn index(&self) -> &KnowledgeIndex {
        &self.deps.index
    }

    // ── Knowledge base ─────────────────────────────────────────────────

    pub async fn ingest(&self, course_id: i64) -> Result<IngestReport> {
        ingest::ingest_course(
            self.deps.content.as_ref(),
            &self.deps.index,
            course_id,
            &self.deps.chunking,
        )
        .await
    }

    pub async fn preview_ingest(&self, course_id: i64) -> Result<IngestReport> {
        ingest::preview_course(self.deps.content.as_ref(), course_id, &self.deps.chunking).await
    }

    pub async fn get_summary(&self, course_id: i64) -> Result<KnowledgeSummary> {
        self.deps.index.summarize(course_id).await
    }

    /// Remove a course's knowledge. Returns the number of chunks removed.
    pub async fn clear(&self, course_id: i64) -> Result<usize> {
        self.deps.index.clear(course_id).await
    }

    // ── Tutoring ───────────────────────────────────────────────────────

    async fn student_context(&self, student_id: i64, course_id: i64) -> Result<StudentContext> {
        let profile = self
            .deps
            .students
            .get_student_profile(student_id)
            .await
            .map_err(TutorError::student_data)?;
        let progress = self
            .deps
            .students
            .get_student_progress(student_id, course_id)
            .await
            .map_err(TutorError::student_data)?;
        Ok(StudentContext::from_parts(profile, progress))
    }

    /// Answer a student question from the course's knowledge.
    pub async fn ask(&self, course_id: i64, question: &str, student_id: i64) -> Result<TutorAnswer> {
        if question.trim().is_empty() {
            return Err(TutorError::InvalidRequest("question must not be empty".into()));
        }

        let student = self.student_context(student_id, course_id).await?;
        let chunks = retrieve(&self.deps.index, course_id, question, QA_TOP_K).await?;
        let prompt = tutoring_prompt(&chunks, &student, question);
        let answer = self
            .deps
            .generator
            .generate(&prompt)
            .await
            .map_err(TutorError::generation)?;

        if let Some(conversations) = &self.deps.conversations {
            conversations
                .add_message(course_id, student_id, ChatRole::User, question)
                .await
                .map_err(TutorError::storage)?;
            conversations
                .add_message(course_id, student_id, ChatRole::Assistant, &answer)
                .await
                .map_err(TutorError::storage)?;
        }

        Ok(TutorAnswer {
            answer,
            sources: chunks.into_iter().map(|c| c.metadata).collect(),
        })
    }

    /// Generate one multiple-choice question. Malformed model output yields
    /// the fallback quiz, not an error.
    pub async fn make_quiz(&self, course_id: i64, topic: &str) -> Result<QuizSpec> {
        if topic.trim().is_empty() {
            return Err(TutorError::InvalidRequest("topic must not be empty".into()));
        }

        let chunks = retrieve(&self.deps.index, course_id, topic, QUIZ_TOP_K).await?;
        let raw = self
            .deps
            .generator
            .generate(&quiz_prompt(&chunks, topic))
            .await
            .map_err(TutorError::generation)?;
        Ok(parse_quiz_response(&raw, topic))
    }

    /// Record a tutor-generated quiz answer as `"{topic} Quiz"`, scored 100
    /// or 0. A later answer for the same topic replaces the earlier score.
    pub async fn submit_quiz(
        &self,
        course_id: i64,
        student_id: i64,
        topic: &str,
        is_correct: bool,
    ) -> Result<QuizSubmissionResult> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TutorError::InvalidRequest("topic must not be empty".into()));
        }
        let quiz_name = format!("{} Quiz", topic);
        let score = if is_correct { 100.0 } else { 0.0 };
        self.deps
            .students
            .record_quiz_score(student_id, course_id, &quiz_name, score)
            .await
            .map_err(TutorError::student_data)?;
        Ok(QuizSubmissionResult { quiz_name, score })
    }

    pub async fn learning_path(&self, course_id: i64, student_id: i64) -> Result<LearningPathResult> {
        let progress = self
            .deps
            .students
            .get_student_progress(student_id, course_id)
            .await
            .map_err(TutorError::student_data)?;
        let pinned = self
            .deps
            .students
            .get_learning_path_overrides(student_id, course_id)
            .await
            .map_err(TutorError::student_data)?;

        planner::learning_path(
            &self.deps.index,
            self.deps.generator.as_ref(),
            course_id,
            &progress.quiz_scores,
            &pinned,
        )
        .await
    }

    pub async fn history(
        &self,
        course_id: i64,
        student_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        match &self.deps.conversations {
            Some(conversations) => conversations
                .history(course_id, student_id, limit)
                .await
                .map_err(TutorError::storage),
            None => Ok(Vec::new()),
        }
    }

    // ── Platform and students ──────────────────────────────────────────

    pub async fn courses(&self) -> Result<Vec<CourseSummary>> {
        self.deps
            .content
            .get_courses()
            .await
            .map_err(TutorError::upstream)
    }

    pub async fn analytics(&self, course_id: i64) -> Result<CourseAnalytics> {
        analytics::course_analytics(
            self.deps.grades.as_ref(),
            self.deps.students.as_ref(),
            course_id,
        )
        .await
    }

    pub async fn get_profile(&self, student_id: i64) -> Result<StudentProfile> {
        self.deps
            .students
            .get_student_profile(student_id)
            .await
            .map_err(TutorError::student_data)
    }

    pub async fn update_profile(
        &self,
        student_id: i64,
        update: ProfileUpdate,
    ) -> Result<StudentProfile> {
        self.deps
            .students
            .update_student_profile(student_id, update)
            .await
            .map_err(TutorError::student_data)
    }

    pub async fn get_overrides(&self, student_id: i64, course_id: i64) -> Result<Vec<String>> {
        self.deps
            .students
            .get_learning_path_overrides(student_id, course_id)
            .await
            .map_err(TutorError::student_data)
    }

    pub async fn set_overrides(
        &self,
        student_id: i64,
        course_id: i64,
        pinned: Vec<String>,
    ) -> Result<Vec<String>> {
        self.deps
            .students
            .set_learning_path_overrides(student_id, course_id, pinned)
            .await
            .map_err(TutorError::student_data)
    }
}
