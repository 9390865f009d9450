//! SQLite-backed [`KnowledgeStore`].
//!
//! Chunks live in the `knowledge_chunks` table (see [`crate::migrate`]),
//! one row per chunk with its embedding as a little-endian `f32` BLOB.
//! Replacing a course runs its delete and inserts in one transaction, so
//! concurrent readers see either the old chunk set or the new one.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::chunk::text_hash;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ChunkMetadata, KnowledgeChunk, ModuleType};

use super::{rank, EmbeddedChunk, KnowledgeStore, ScoredChunk};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_chunk(course_id: i64, row: &SqliteRow) -> KnowledgeChunk {
    let module_type: String = row.get("module_type");
    KnowledgeChunk {
        text: row.get("text"),
        metadata: ChunkMetadata {
            course_id,
            source_label: row.get("source"),
            module_type: ModuleType::from(module_type),
            module_name: row.get("module_name"),
            section_name: row.get("section_name"),
        },
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn replace_course(&self, course_id: i64, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM knowledge_chunks WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        for (ordinal, embedded) in chunks.iter().enumerate() {
            let chunk = &embedded.chunk;
            sqlx::query(
                r#"
                INSERT INTO knowledge_chunks (id, course_id, ordinal, text, hash, source,
                                              module_type, module_name, section_name,
                                              embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(course_id)
            .bind(ordinal as i64)
            .bind(&chunk.text)
            .bind(text_hash(&chunk.text))
            .bind(&chunk.metadata.source_label)
            .bind(chunk.metadata.module_type.as_str())
            .bind(&chunk.metadata.module_name)
            .bind(&chunk.metadata.section_name)
            .bind(vec_to_blob(&embedded.vector))
            .bind(embedded.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    async fn delete_course(&self, course_id: i64) -> Result<usize> {
        let result = sqlx::query("DELETE FROM knowledge_chunks WHERE course_id = ?")
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn chunks_for_course(&self, course_id: i64) -> Result<Vec<KnowledgeChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT text, source, module_type, module_name, section_name
            FROM knowledge_chunks
            WHERE course_id = ?
            ORDER BY ordinal ASC
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row_to_chunk(course_id, row)).collect())
    }

    async fn vector_search(
        &self,
        course_id: i64,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT ordinal, text, source, module_type, module_name, section_name, embedding
            FROM knowledge_chunks
            WHERE course_id = ?
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                (
                    row.get::<i64, _>("ordinal"),
                    row_to_chunk(course_id, row),
                    cosine_similarity(query_vec, &vector),
                )
            })
            .collect();
        Ok(rank(candidates, k))
    }
}
