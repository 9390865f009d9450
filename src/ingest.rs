//! Course ingestion pipeline.
//!
//! Coordinates one pass: content source → normalization (with attachment
//! extraction) → chunking → knowledge index replace. A pass always replaces
//! the course's previous chunks; a course whose content tree has no modules
//! is cleared and reported as [`IngestStatus::Empty`].
//!
//! A content-source failure aborts the pass before anything is written.
//! Attachment failures only degrade their module.

use tracing::{info, warn};

use crate::chunk::chunk_item;
use crate::config::ChunkingConfig;
use crate::error::{Result, TutorError};
use crate::index::KnowledgeIndex;
use crate::lms::ContentSource;
use crate::models::{IngestReport, IngestStatus, KnowledgeChunk};
use crate::normalize::{normalize, NormalizedModule};

struct PreparedCourse {
    chunks: Vec<KnowledgeChunk>,
    module_count: usize,
    extraction_failures: usize,
}

async fn prepare(
    source: &dyn ContentSource,
    course_id: i64,
    chunking: &ChunkingConfig,
) -> Result<PreparedCourse> {
    let sections = source
        .get_course_contents(course_id)
        .await
        .map_err(TutorError::upstream)?;

    let modules: Vec<NormalizedModule> = normalize(course_id, &sections, source).await;
    let extraction_failures = modules.iter().map(|m| m.extraction_failures).sum();
    let chunks = modules
        .iter()
        .flat_map(|m| chunk_item(&m.item, &m.composite, chunking))
        .collect();

    Ok(PreparedCourse {
        chunks,
        module_count: modules.len(),
        extraction_failures,
    })
}

/// Run one ingestion pass for `course_id`.
pub async fn ingest_course(
    source: &dyn ContentSource,
    index: &KnowledgeIndex,
    course_id: i64,
    chunking: &ChunkingConfig,
) -> Result<IngestReport> {
    let prepared = prepare(source, course_id, chunking).await?;

    if prepared.extraction_failures > 0 {
        warn!(
            course_id,
            failures = prepared.extraction_failures,
            "some attachments could not be extracted"
        );
    }

    if prepared.module_count == 0 {
        index.clear(course_id).await?;
        info!(course_id, "course has no modules; cleared index");
        return Ok(IngestReport {
            course_id,
            status: IngestStatus::Empty,
            chunk_count: 0,
            module_count: 0,
            extraction_failures: 0,
        });
    }

    let chunk_count = index.replace(course_id, prepared.chunks).await?;
    info!(
        course_id,
        modules = prepared.module_count,
        chunks = chunk_count,
        "ingested course"
    );

    Ok(IngestReport {
        course_id,
        status: IngestStatus::Success,
        chunk_count,
        module_count: prepared.module_count,
        extraction_failures: prepared.extraction_failures,
    })
}

/// Fetch, normalize, and chunk without embedding or writing anything.
pub async fn preview_course(
    source: &dyn ContentSource,
    course_id: i64,
    chunking: &ChunkingConfig,
) -> Result<IngestReport> {
    let prepared = prepare(source, course_id, chunking).await?;
    let status = if prepared.module_count == 0 {
        IngestStatus::Empty
    } else {
        IngestStatus::Success
    };
    Ok(IngestReport {
        course_id,
        status,
        chunk_count: prepared.chunks.len(),
        module_count: prepared.module_count,
        extraction_failures: prepared.extraction_failures,
    })
}

/// Human-readable report for the CLI.
pub fn format_report(report: &IngestReport, dry_run: bool) -> String {
    let mut out = String::new();
    if dry_run {
        out.push_str(&format!("ingest course {} (dry-run)\n", report.course_id));
    } else {
        out.push_str(&format!("ingest course {}\n", report.course_id));
    }
    out.push_str(&format!("  modules: {}\n", report.module_count));
    out.push_str(&format!("  chunks: {}\n", report.chunk_count));
    out.push_str(&format!(
        "  extraction failures: {}\n",
        report.extraction_failures
    ));
    match report.status {
        IngestStatus::Success => out.push_str("ok\n"),
        IngestStatus::Empty => out.push_str("empty: course has no modules\n"),
    }
    out
}
