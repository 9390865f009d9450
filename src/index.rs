//! Per-course knowledge index.
//!
//! [`KnowledgeIndex`] puts an [`Embedder`] in front of a [`KnowledgeStore`]
//! and owns the replace-by-course semantics of ingestion:
//!
//! 1. every chunk must carry the target `course_id`;
//! 2. all chunks are embedded before anything is deleted, so an embedding
//!    failure leaves the previous pass intact;
//! 3. the store swaps the course's chunks in one step.
//!
//! A per-course `tokio::sync::RwLock` serializes a replace against reads of
//! the same course. Reads share the lock; other courses are never blocked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::embedding::Embedder;
use crate::error::{Result, TutorError};
use crate::models::{KnowledgeChunk, KnowledgeSummary, SourceSummary};
use crate::store::{EmbeddedChunk, KnowledgeStore, ScoredChunk};

#[derive(Default)]
struct CourseLocks {
    locks: Mutex<HashMap<i64, Arc<RwLock<()>>>>,
}

impl CourseLocks {
    fn for_course(&self, course_id: i64) -> Arc<RwLock<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(course_id).or_default().clone()
    }
}

pub struct KnowledgeIndex {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    locks: CourseLocks,
}

impl KnowledgeIndex {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            batch_size: batch_size.max(1),
            locks: CourseLocks::default(),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Replace every chunk of `course_id` with `chunks`. Returns the number
    /// of chunks now indexed for the course.
    pub async fn replace(&self, course_id: i64, chunks: Vec<KnowledgeChunk>) -> Result<usize> {
        if let Some(stray) = chunks.iter().find(|c| c.metadata.course_id != course_id) {
            return Err(TutorError::InvalidRequest(format!(
                "chunk for course {} passed to replace of course {}",
                stray.metadata.course_id, course_id
            )));
        }

        let embedded = self.embed_chunks(chunks).await?;

        let lock = self.locks.for_course(course_id);
        let _guard = lock.write().await;
        let count = self
            .store
            .replace_course(course_id, &embedded)
            .await
            .map_err(TutorError::storage)?;
        info!(course_id, chunks = count, "replaced course knowledge");
        Ok(count)
    }

    /// Remove every chunk of `course_id`. Returns the number removed.
    pub async fn clear(&self, course_id: i64) -> Result<usize> {
        let lock = self.locks.for_course(course_id);
        let _guard = lock.write().await;
        let removed = self
            .store
            .delete_course(course_id)
            .await
            .map_err(TutorError::storage)?;
        info!(course_id, removed, "cleared course knowledge");
        Ok(removed)
    }

    /// All chunks of a course in ingestion order. Never-ingested courses
    /// yield an empty list.
    pub async fn query_by_course(&self, course_id: i64) -> Result<Vec<KnowledgeChunk>> {
        let lock = self.locks.for_course(course_id);
        let _guard = lock.read().await;
        self.store
            .chunks_for_course(course_id)
            .await
            .map_err(TutorError::storage)
    }

    /// The `k` chunks of `course_id` nearest to `query_text`.
    pub async fn similarity_search(
        &self,
        course_id: i64,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<KnowledgeChunk>> {
        Ok(self
            .scored_search(course_id, query_text, k)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    pub async fn scored_search(
        &self,
        course_id: i64,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(query_text)
            .await
            .map_err(TutorError::embedding)?;

        let lock = self.locks.for_course(course_id);
        let _guard = lock.read().await;
        let hits = self
            .store
            .vector_search(course_id, &query_vec, k)
            .await
            .map_err(TutorError::storage)?;
        debug!(course_id, k, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    /// Group a course's chunks by module name and type.
    pub async fn summarize(&self, course_id: i64) -> Result<KnowledgeSummary> {
        let chunks = self.query_by_course(course_id).await?;
        Ok(summarize_chunks(course_id, &chunks))
    }

    async fn embed_chunks(&self, chunks: Vec<KnowledgeChunk>) -> Result<Vec<EmbeddedChunk>> {
        let mut embedded = Vec::with_capacity(chunks.len());
        let mut remaining = chunks.into_iter().peekable();

        while remaining.peek().is_some() {
            let batch: Vec<KnowledgeChunk> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(TutorError::embedding)?;
            if vectors.len() != batch.len() {
                return Err(TutorError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            embedded.extend(
                batch
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
            );
        }
        Ok(embedded)
    }
}

/// Pure metadata aggregation; sources appear in first-seen order.
pub fn summarize_chunks(course_id: i64, chunks: &[KnowledgeChunk]) -> KnowledgeSummary {
    let mut sources: Vec<SourceSummary> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();

    for chunk in chunks {
        let meta = &chunk.metadata;
        let key = (meta.module_name.clone(), meta.module_type.as_str().to_string());
        match positions.get(&key) {
            Some(&pos) => sources[pos].chunk_count += 1,
            None => {
                positions.insert(key, sources.len());
                sources.push(SourceSummary {
                    name: meta.module_name.clone(),
                    module_type: meta.module_type.clone(),
                    chunk_count: 1,
                    section: meta.section_name.clone(),
                });
            }
        }
    }

    KnowledgeSummary {
        course_id,
        document_count: chunks.len(),
        sources,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::models::{ChunkMetadata, ModuleType};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};
    use tokio::time::timeout;

    fn index() -> KnowledgeIndex {
        KnowledgeIndex::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashedEmbedder::new(64)),
            2,
        )
    }

    fn chunk(course_id: i64, module: &str, module_type: ModuleType, text: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            text: text.to_string(),
            metadata: ChunkMetadata::new(course_id, "Week 1", module, module_type),
        }
    }

    #[tokio::test]
    async fn test_replace_leaves_only_latest_pass() {
        let index = index();
        index
            .replace(1, vec![chunk(1, "Old", ModuleType::Page, "stale text")])
            .await
            .unwrap();
        let count = index
            .replace(
                1,
                vec![
                    chunk(1, "New", ModuleType::Page, "fresh one"),
                    chunk(1, "New", ModuleType::Page, "fresh two"),
                    chunk(1, "New", ModuleType::Page, "fresh three"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(count, 3);

        let chunks = index.query_by_course(1).await.unwrap();
        assert!(chunks.iter().all(|c| c.metadata.module_name == "New"));
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_chunks() {
        let index = index();
        let err = index
            .replace(1, vec![chunk(2, "M", ModuleType::Page, "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_never_ingested_course_is_empty_not_error() {
        let index = index();
        assert!(index.query_by_course(42).await.unwrap().is_empty());
        let summary = index.summarize(42).await.unwrap();
        assert_eq!(summary.document_count, 0);
        assert!(summary.sources.is_empty());
        assert!(index.similarity_search(42, "anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similarity_search_finds_matching_text() {
        let index = index();
        index
            .replace(
                3,
                vec![
                    chunk(3, "Cells", ModuleType::Page, "mitochondria produce energy for the cell"),
                    chunk(3, "Stars", ModuleType::Page, "stars fuse hydrogen into helium"),
                ],
            )
            .await
            .unwrap();
        let hits = index
            .similarity_search(3, "mitochondria energy cell", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.module_name, "Cells");
        assert!(index.similarity_search(3, "stars", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_summarize_groups_by_module_and_type() {
        let chunks = vec![
            chunk(1, "Intro", ModuleType::Resource, "a"),
            chunk(1, "Quiz 1", ModuleType::Quiz, "b"),
            chunk(1, "Intro", ModuleType::Resource, "c"),
            chunk(1, "Intro", ModuleType::Page, "d"),
        ];
        let summary = summarize_chunks(1, &chunks);
        assert_eq!(summary.document_count, 4);
        assert_eq!(summary.sources.len(), 3);
        assert_eq!(summary.sources[0].name, "Intro");
        assert_eq!(summary.sources[0].chunk_count, 2);
        assert_eq!(summary.sources[1].module_type, ModuleType::Quiz);
        assert_eq!(summary.sources[2].module_type, ModuleType::Page);
    }

    /// Embeds like [`HashedEmbedder`] until `fail` is set.
    struct FlakyEmbedder {
        inner: HashedEmbedder,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("embedding backend offline");
            }
            self.inner.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KnowledgeStore for BrokenStore {
        async fn replace_course(&self, _course_id: i64, _chunks: &[EmbeddedChunk]) -> anyhow::Result<usize> {
            anyhow::bail!("disk I/O error")
        }
        async fn delete_course(&self, _course_id: i64) -> anyhow::Result<usize> {
            anyhow::bail!("disk I/O error")
        }
        async fn chunks_for_course(&self, _course_id: i64) -> anyhow::Result<Vec<KnowledgeChunk>> {
            Ok(Vec::new())
        }
        async fn vector_search(
            &self,
            _course_id: i64,
            _query_vec: &[f32],
            _k: usize,
        ) -> anyhow::Result<Vec<ScoredChunk>> {
            Ok(Vec::new())
        }
    }

    /// In-memory store whose replace blocks on `gate` once `armed` is set.
    struct GatedStore {
        inner: InMemoryStore,
        armed: AtomicBool,
        entered: Notify,
        gate: Semaphore,
    }

    #[async_trait]
    impl KnowledgeStore for GatedStore {
        async fn replace_course(&self, course_id: i64, chunks: &[EmbeddedChunk]) -> anyhow::Result<usize> {
            if self.armed.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.gate.acquire().await?.forget();
            }
            self.inner.replace_course(course_id, chunks).await
        }
        async fn delete_course(&self, course_id: i64) -> anyhow::Result<usize> {
            self.inner.delete_course(course_id).await
        }
        async fn chunks_for_course(&self, course_id: i64) -> anyhow::Result<Vec<KnowledgeChunk>> {
            self.inner.chunks_for_course(course_id).await
        }
        async fn vector_search(
            &self,
            course_id: i64,
            query_vec: &[f32],
            k: usize,
        ) -> anyhow::Result<Vec<ScoredChunk>> {
            self.inner.vector_search(course_id, query_vec, k).await
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_keeps_previous_pass() {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashedEmbedder::new(32),
            fail: AtomicBool::new(false),
        });
        let index = KnowledgeIndex::new(Arc::new(InMemoryStore::new()), embedder.clone(), 4);
        index
            .replace(1, vec![chunk(1, "Old", ModuleType::Page, "kept text")])
            .await
            .unwrap();

        embedder.fail.store(true, Ordering::SeqCst);
        let err = index
            .replace(1, vec![chunk(1, "New", ModuleType::Page, "lost text")])
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Embedding(_)));
        assert!(err.to_string().contains("embedding backend offline"));

        let chunks = index.query_by_course(1).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "kept text");
    }

    #[tokio::test]
    async fn test_store_failure_is_storage_error() {
        let index = KnowledgeIndex::new(Arc::new(BrokenStore), Arc::new(HashedEmbedder::new(32)), 4);
        let err = index
            .replace(1, vec![chunk(1, "M", ModuleType::Page, "text")])
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Storage(_)));
        assert!(err.to_string().contains("disk I/O error"));

        let err = index.clear(1).await.unwrap_err();
        assert!(matches!(err, TutorError::Storage(_)));
    }

    #[tokio::test]
    async fn test_replace_is_serialized_against_reads_of_same_course() {
        let store = Arc::new(GatedStore {
            inner: InMemoryStore::new(),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        });
        let index = Arc::new(KnowledgeIndex::new(
            store.clone(),
            Arc::new(HashedEmbedder::new(32)),
            4,
        ));

        index
            .replace(
                1,
                vec![
                    chunk(1, "Old", ModuleType::Page, "old one"),
                    chunk(1, "Old", ModuleType::Page, "old two"),
                ],
            )
            .await
            .unwrap();
        index
            .replace(2, vec![chunk(2, "Other", ModuleType::Page, "other course")])
            .await
            .unwrap();

        store.armed.store(true, Ordering::SeqCst);
        let fresh = vec![
            chunk(1, "New", ModuleType::Page, "new one"),
            chunk(1, "New", ModuleType::Page, "new two"),
            chunk(1, "New", ModuleType::Page, "new three"),
        ];
        let writer = tokio::spawn({
            let index = index.clone();
            let fresh = fresh.clone();
            async move { index.replace(1, fresh).await }
        });
        store.entered.notified().await;

        // The writer holds course 1 mid-swap.
        assert!(timeout(Duration::from_millis(50), index.query_by_course(1))
            .await
            .is_err());
        assert!(
            timeout(Duration::from_millis(50), index.similarity_search(1, "one", 3))
                .await
                .is_err()
        );

        let other = timeout(Duration::from_secs(1), index.query_by_course(2))
            .await
            .expect("course 2 is not blocked by a replace of course 1")
            .unwrap();
        assert_eq!(other.len(), 1);

        let reader = tokio::spawn({
            let index = index.clone();
            async move { index.query_by_course(1).await }
        });

        store.gate.add_permits(1);
        assert_eq!(writer.await.unwrap().unwrap(), 3);

        let seen = reader.await.unwrap().unwrap();
        assert_eq!(seen, fresh);
        assert_eq!(index.query_by_course(1).await.unwrap(), fresh);
    }
}
