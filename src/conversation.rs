//! Per-student chat history, scoped by course.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::fmt;

/// Default number of messages returned by [`ConversationStore::history`].
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "assistant" => ChatRole::Assistant,
            _ => ChatRole::User,
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub created_at: String,
}

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn add_message(
        &self,
        course_id: i64,
        student_id: i64,
        role: ChatRole,
        content: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (course_id, student_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(student_id)
        .bind(role.as_str())
        .bind(content)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The latest `limit` messages, oldest first.
    pub async fn history(
        &self,
        course_id: i64,
        student_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at FROM (
                SELECT id, role, content, created_at
                FROM messages
                WHERE course_id = ? AND student_id = ?
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(course_id)
        .bind(student_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChatMessage {
                role: ChatRole::parse(row.get::<&str, _>("role")),
                content: row.get("content"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}
