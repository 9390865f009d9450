//! Course-scoped retrieval.
//!
//! A thin layer over [`KnowledgeIndex::similarity_search`] with the fixed
//! `k` of each call site.

use crate::error::Result;
use crate::index::KnowledgeIndex;
use crate::models::KnowledgeChunk;

/// Chunks retrieved to answer a student question.
pub const QA_TOP_K: usize = 3;
/// Chunks retrieved to ground one quiz question.
pub const QUIZ_TOP_K: usize = 3;
/// Chunks retrieved per weak topic by the learning path planner.
pub const PLAN_TOP_K_PER_TOPIC: usize = 2;

pub async fn retrieve(
    index: &KnowledgeIndex,
    course_id: i64,
    query: &str,
    k: usize,
) -> Result<Vec<KnowledgeChunk>> {
    index.similarity_search(course_id, query, k).await
}

/// Chunk texts joined with blank lines, as embedded in every prompt.
pub fn join_context(chunks: &[KnowledgeChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
