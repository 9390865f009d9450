//! In-memory [`KnowledgeStore`] for tests and throwaway sessions.
//!
//! All courses live in one `HashMap` behind a `std::sync::RwLock`; a replace
//! swaps the course's vector under a single write lock. Vector search is
//! brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::KnowledgeChunk;

use super::{rank, EmbeddedChunk, KnowledgeStore, ScoredChunk};

struct StoredChunk {
    chunk: KnowledgeChunk,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    courses: RwLock<HashMap<i64, Vec<StoredChunk>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            courses: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn replace_course(&self, course_id: i64, chunks: &[EmbeddedChunk]) -> Result<usize> {
        let stored: Vec<StoredChunk> = chunks
            .iter()
            .map(|c| StoredChunk {
                chunk: c.chunk.clone(),
                vector: c.vector.clone(),
            })
            .collect();
        let count = stored.len();

        let mut courses = self.courses.write().map_err(poisoned)?;
        if stored.is_empty() {
            courses.remove(&course_id);
        } else {
            courses.insert(course_id, stored);
        }
        Ok(count)
    }

    async fn delete_course(&self, course_id: i64) -> Result<usize> {
        let mut courses = self.courses.write().map_err(poisoned)?;
        Ok(courses.remove(&course_id).map(|c| c.len()).unwrap_or(0))
    }

    async fn chunks_for_course(&self, course_id: i64) -> Result<Vec<KnowledgeChunk>> {
        let courses = self.courses.read().map_err(poisoned)?;
        Ok(courses
            .get(&course_id)
            .map(|stored| stored.iter().map(|s| s.chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn vector_search(
        &self,
        course_id: i64,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let courses = self.courses.read().map_err(poisoned)?;
        let Some(stored) = courses.get(&course_id) else {
            return Ok(Vec::new());
        };

        let candidates = stored
            .iter()
            .enumerate()
            .map(|(ordinal, s)| {
                (
                    ordinal as i64,
                    s.chunk.clone(),
                    cosine_similarity(query_vec, &s.vector),
                )
            })
            .collect();
        Ok(rank(candidates, k))
    }
}
