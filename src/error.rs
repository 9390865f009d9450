//! Error taxonomy for the tutoring core.
//!
//! Per-attachment extraction failures are not part of this enum: they are
//! [`ExtractError`](crate::extract::ExtractError) values rendered into the
//! composite text and never abort an ingestion. Malformed quiz output is
//! likewise recovered inside [`quiz`](crate::quiz) and never surfaces here.

use thiserror::Error;

/// Errors surfaced by [`TutorService`](crate::tutor::TutorService) operations.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The content source could not be reached or returned an error payload.
    /// Aborts the whole ingestion call.
    #[error("content source unavailable: {0}")]
    UpstreamFetch(String),

    /// The knowledge index failed to delete, insert, or read chunks.
    #[error("knowledge index storage error: {0}")]
    Storage(String),

    /// The embedding capability failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The generation capability failed (transport or API error).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The student data store could not be read or written.
    #[error("student data unavailable: {0}")]
    StudentData(String),

    /// The caller passed something the core cannot act on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Anything else, carrying the underlying message chain.
    #[error("{0:#}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TutorError>;

/// The constructors below keep the whole `anyhow` context chain
/// (`outer: cause`), not only the outermost message.
impl TutorError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamFetch(format!("{:#}", err))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{:#}", err))
    }

    pub fn embedding(err: impl std::fmt::Display) -> Self {
        Self::Embedding(format!("{:#}", err))
    }

    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    pub fn student_data(err: impl std::fmt::Display) -> Self {
        Self::StudentData(format!("{:#}", err))
    }
}
