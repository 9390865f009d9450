//! Student profiles, progress, and the quiz-score ledger.
//!
//! Profiles and learning-path pins are owned locally; identity (name,
//! email) and platform quiz grades come from the LMS when one is attached.
//! Scores recorded by the tutor itself are merged into progress under an
//! `[AI] ` prefix so they never collide with platform quiz names.
//!
//! Tables (see [`crate::migrate`]):
//!
//! | Table | Key |
//! |-------|-----|
//! | `student_profiles` | `student_id` |
//! | `quiz_scores` | `(student_id, course_id, quiz_name)` |
//! | `learning_path_overrides` | `(student_id, course_id)` |

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::grades::clamp_score;
use crate::lms::GradeSource;
use crate::models::{StudentProfile, StudentProgress};

/// Marks tutor-generated quiz scores in a merged progress snapshot.
pub const AI_QUIZ_PREFIX: &str = "[AI] ";

/// Partial profile update. Absent fields are left unchanged; an empty
/// learning style is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub learning_style: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn get_student_profile(&self, student_id: i64) -> Result<StudentProfile>;

    async fn get_student_progress(&self, student_id: i64, course_id: i64)
        -> Result<StudentProgress>;

    async fn update_student_profile(
        &self,
        student_id: i64,
        update: ProfileUpdate,
    ) -> Result<StudentProfile>;

    /// Upsert one ledger entry; the latest score for a quiz name wins.
    async fn record_quiz_score(
        &self,
        student_id: i64,
        course_id: i64,
        quiz_name: &str,
        score: f64,
    ) -> Result<()>;

    async fn get_learning_path_overrides(&self, student_id: i64, course_id: i64)
        -> Result<Vec<String>>;

    async fn set_learning_path_overrides(
        &self,
        student_id: i64,
        course_id: i64,
        pinned: Vec<String>,
    ) -> Result<Vec<String>>;
}

pub struct SqliteStudentStore {
    pool: SqlitePool,
    grades: Option<Arc<dyn GradeSource>>,
}

struct LocalProfile {
    learning_style: String,
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    interests: Vec<String>,
}

impl Default for LocalProfile {
    fn default() -> Self {
        Self {
            learning_style: "General".to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            interests: Vec::new(),
        }
    }
}

fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl SqliteStudentStore {
    pub fn new(pool: SqlitePool, grades: Option<Arc<dyn GradeSource>>) -> Self {
        Self { pool, grades }
    }

    async fn load_local(&self, student_id: i64) -> Result<Option<LocalProfile>> {
        let row = sqlx::query(
            "SELECT learning_style, strengths_json, weaknesses_json, interests_json
             FROM student_profiles WHERE student_id = ?",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| LocalProfile {
            learning_style: row.get("learning_style"),
            strengths: decode_list(row.get("strengths_json")),
            weaknesses: decode_list(row.get("weaknesses_json")),
            interests: decode_list(row.get("interests_json")),
        }))
    }

    async fn save_local(&self, student_id: i64, profile: &LocalProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO student_profiles (student_id, learning_style, strengths_json,
                                          weaknesses_json, interests_json, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(student_id) DO UPDATE SET
                learning_style = excluded.learning_style,
                strengths_json = excluded.strengths_json,
                weaknesses_json = excluded.weaknesses_json,
                interests_json = excluded.interests_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(student_id)
        .bind(&profile.learning_style)
        .bind(serde_json::to_string(&profile.strengths)?)
        .bind(serde_json::to_string(&profile.weaknesses)?)
        .bind(serde_json::to_string(&profile.interests)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn lms_quiz_scores(&self, student_id: i64, course_id: i64) -> Vec<(String, f64)> {
        let Some(grades) = &self.grades else {
            return Vec::new();
        };
        match grades.get_quiz_grades(course_id, student_id).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(student_id, course_id, error = %e, "could not fetch platform grades");
                Vec::new()
            }
        }
    }

    fn with_identity(&self, student_id: i64, local: LocalProfile) -> StudentProfile {
        let mut profile = StudentProfile::new_default(student_id);
        profile.learning_style = local.learning_style;
        profile.strengths = local.strengths;
        profile.weaknesses = local.weaknesses;
        profile.interests = local.interests;
        profile
    }
}

#[async_trait]
impl StudentStore for SqliteStudentStore {
    async fn get_student_profile(&self, student_id: i64) -> Result<StudentProfile> {
        let local = match self.load_local(student_id).await? {
            Some(local) => local,
            None => {
                let local = LocalProfile::default();
                self.save_local(student_id, &local).await?;
                local
            }
        };
        let mut profile = self.with_identity(student_id, local);

        if let Some(grades) = &self.grades {
            match grades.get_user(student_id).await {
                Ok(Some(user)) => {
                    let name = user.fullname();
                    if !name.is_empty() {
                        profile.name = name;
                    }
                    profile.email = user.email.or(profile.email);
                    profile.id = user.id;
                }
                Ok(None) => debug!(student_id, "student not found on platform"),
                Err(e) => warn!(student_id, error = %e, "could not fetch platform identity"),
            }
        }
        Ok(profile)
    }

    async fn get_student_progress(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<StudentProgress> {
        let mut progress = StudentProgress::default();
        for (name, score) in self.lms_quiz_scores(student_id, course_id).await {
            progress.quiz_scores.insert(name, clamp_score(score));
        }

        let rows = sqlx::query(
            "SELECT quiz_name, score FROM quiz_scores WHERE student_id = ? AND course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let name: String = row.get("quiz_name");
            let score: f64 = row.get("score");
            progress
                .quiz_scores
                .insert(format!("{}{}", AI_QUIZ_PREFIX, name), score);
        }
        Ok(progress)
    }

    async fn update_student_profile(
        &self,
        student_id: i64,
        update: ProfileUpdate,
    ) -> Result<StudentProfile> {
        let mut local = self.load_local(student_id).await?.unwrap_or_default();
        if let Some(style) = update.learning_style.filter(|s| !s.trim().is_empty()) {
            local.learning_style = style;
        }
        if let Some(strengths) = update.strengths {
            local.strengths = strengths;
        }
        if let Some(weaknesses) = update.weaknesses {
            local.weaknesses = weaknesses;
        }
        if let Some(interests) = update.interests {
            local.interests = interests;
        }
        self.save_local(student_id, &local).await?;
        self.get_student_profile(student_id).await
    }

    async fn record_quiz_score(
        &self,
        student_id: i64,
        course_id: i64,
        quiz_name: &str,
        score: f64,
    ) -> Result<()> {
        debug!(student_id, course_id, quiz_name, score, "recording quiz score");
        sqlx::query(
            r#"
            INSERT INTO quiz_scores (student_id, course_id, quiz_name, score, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(student_id, course_id, quiz_name) DO UPDATE SET
                score = excluded.score,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(quiz_name)
        .bind(clamp_score(score))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_learning_path_overrides(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Vec<String>> {
        let pinned: Option<String> = sqlx::query_scalar(
            "SELECT pinned_json FROM learning_path_overrides WHERE student_id = ? AND course_id = ?",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pinned.as_deref().map(decode_list).unwrap_or_default())
    }

    async fn set_learning_path_overrides(
        &self,
        student_id: i64,
        course_id: i64,
        pinned: Vec<String>,
    ) -> Result<Vec<String>> {
        sqlx::query(
            r#"
            INSERT INTO learning_path_overrides (student_id, course_id, pinned_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(student_id, course_id) DO UPDATE SET
                pinned_json = excluded.pinned_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(serde_json::to_string(&pinned)?)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(pinned)
    }
}
