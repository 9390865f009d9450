//! Storage abstraction for the course knowledge index.
//!
//! The [`KnowledgeStore`] trait holds embedded chunks partitioned by course.
//! Two backends ship with the crate:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | [`SqliteStore`] | [`sqlite`] | persistent index behind the CLI and server |
//! | [`InMemoryStore`] | [`memory`] | tests and throwaway sessions |
//!
//! Both backends keep insertion order per course (the `ordinal`) and rank
//! vector search by cosine similarity descending, breaking ties by ordinal.
//! A course's chunks are never visible to a query for another course.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;

use crate::models::KnowledgeChunk;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A chunk paired with its embedding, ready to be written.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: KnowledgeChunk,
    pub vector: Vec<f32>,
}

/// A chunk returned from vector search with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Course-partitioned chunk storage.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`replace_course`](KnowledgeStore::replace_course) | Swap a course's chunks for a new set |
/// | [`delete_course`](KnowledgeStore::delete_course) | Remove every chunk of a course |
/// | [`chunks_for_course`](KnowledgeStore::chunks_for_course) | All chunks of a course, in insertion order |
/// | [`vector_search`](KnowledgeStore::vector_search) | Top-k chunks of a course by cosine similarity |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Replace every chunk of `course_id` with `chunks`. Readers observe
    /// either the old set or the new one. Returns the number written.
    async fn replace_course(&self, course_id: i64, chunks: &[EmbeddedChunk]) -> Result<usize>;

    /// Returns the number of chunks removed.
    async fn delete_course(&self, course_id: i64) -> Result<usize>;

    async fn chunks_for_course(&self, course_id: i64) -> Result<Vec<KnowledgeChunk>>;

    async fn vector_search(
        &self,
        course_id: i64,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Order `(ordinal, chunk, score)` candidates by score descending, then by
/// ordinal, and keep the best `k`.
pub(crate) fn rank(mut candidates: Vec<(i64, KnowledgeChunk, f32)>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    candidates.truncate(k);
    candidates
        .into_iter()
        .map(|(_, chunk, score)| ScoredChunk { chunk, score })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, ModuleType};

    fn chunk(text: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            text: text.to_string(),
            metadata: ChunkMetadata::new(1, "S", "M", ModuleType::Page),
        }
    }

    #[test]
    fn test_rank_breaks_ties_by_insertion_order() {
        let ranked = rank(
            vec![
                (2, chunk("c"), 0.5),
                (0, chunk("a"), 0.5),
                (1, chunk("b"), 0.9),
            ],
            3,
        );
        let texts: Vec<_> = ranked.iter().map(|s| s.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let ranked = rank(vec![(0, chunk("a"), 0.1), (1, chunk("b"), 0.2)], 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.text, "b");
    }
}
