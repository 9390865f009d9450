use anyhow::Result;
use sqlx::SqlitePool;

/// Create every table and index. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Knowledge index: one row per chunk, scoped by course.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_chunks (
            id TEXT PRIMARY KEY,
            course_id INTEGER NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            source TEXT NOT NULL,
            module_type TEXT NOT NULL,
            module_name TEXT NOT NULL,
            section_name TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(course_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_course ON knowledge_chunks(course_id, ordinal)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_profiles (
            student_id INTEGER PRIMARY KEY,
            learning_style TEXT NOT NULL DEFAULT 'General',
            strengths_json TEXT NOT NULL DEFAULT '[]',
            weaknesses_json TEXT NOT NULL DEFAULT '[]',
            interests_json TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Quiz-score ledger: the latest score per (student, course, quiz).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quiz_scores (
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            quiz_name TEXT NOT NULL,
            score REAL NOT NULL,
            recorded_at INTEGER NOT NULL,
            PRIMARY KEY (student_id, course_id, quiz_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS learning_path_overrides (
            student_id INTEGER NOT NULL,
            course_id INTEGER NOT NULL,
            pinned_json TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (student_id, course_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_course_student ON messages(course_id, student_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
