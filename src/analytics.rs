//! Class-level analytics for instructors.
//!
//! Teaching roles are excluded from the roster. At most
//! [`MAX_DETAILED_STUDENTS`] students get a detailed entry; the class
//! average is taken over students with a non-zero average.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::lms::{GradeSource, LmsUser};
use crate::students::StudentStore;

pub const MAX_DETAILED_STUDENTS: usize = 20;

const TEACHING_ROLES: &[&str] = &["editingteacher", "teacher", "manager", "admin", "coursecreator"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAnalytics {
    pub id: i64,
    pub name: String,
    pub avg_score: f64,
    pub quiz_scores: BTreeMap<String, f64>,
    pub learning_style: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseAnalytics {
    pub course_id: i64,
    pub total_students: usize,
    pub active_students: usize,
    pub average_score: f64,
    pub students: Vec<StudentAnalytics>,
}

fn is_teaching_staff(user: &LmsUser) -> bool {
    user.roles
        .iter()
        .any(|role| TEACHING_ROLES.contains(&role.shortname.to_lowercase().as_str()))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub async fn course_analytics(
    grades: &dyn GradeSource,
    students: &dyn StudentStore,
    course_id: i64,
) -> Result<CourseAnalytics> {
    let roster: Vec<LmsUser> = grades
        .get_enrolled_users(course_id)
        .await
        .map_err(TutorError::upstream)?
        .into_iter()
        .filter(|user| !is_teaching_staff(user))
        .collect();

    let total_students = roster.len();
    let mut active_averages = Vec::new();
    let mut detailed = Vec::new();

    for user in roster.iter().take(MAX_DETAILED_STUDENTS) {
        let profile = students
            .get_student_profile(user.id)
            .await
            .map_err(TutorError::student_data)?;
        let progress = students
            .get_student_progress(user.id, course_id)
            .await
            .map_err(TutorError::student_data)?;
        let avg_score = mean(progress.quiz_scores.values().copied());
        if avg_score > 0.0 {
            active_averages.push(avg_score);
        }

        detailed.push(StudentAnalytics {
            id: user.id,
            name: user.fullname(),
            avg_score: round1(avg_score),
            quiz_scores: progress.quiz_scores,
            learning_style: profile.learning_style,
            strengths: profile.strengths,
            weaknesses: profile.weaknesses,
        });
    }

    let active_students = if active_averages.is_empty() {
        total_students
    } else {
        active_averages.len()
    };

    Ok(CourseAnalytics {
        course_id,
        total_students,
        active_students,
        average_score: round1(mean(active_averages)),
        students: detailed,
    })
}
