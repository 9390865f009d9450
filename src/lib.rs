//! # Course Tutor
//!
//! Retrieval-augmented tutoring over learning-platform courses.
//!
//! Course material is pulled from the platform, flattened into one
//! composite text per module (attachments extracted inline), chunked,
//! embedded, and stored per course. Questions, quizzes, and learning paths
//! are answered from the chunks retrieved for a course, combined with the
//! student's profile and quiz history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │  LMS client │──▶│ Normalize+Extract │──▶│ Chunk + Embed │
//! │   (Moodle)  │   │  HTML/PDF/DOCX    │   └───────┬───────┘
//! └─────────────┘   └──────────────────┘           ▼
//!                                           ┌──────────────┐
//!        ┌─────────┐   ┌──────────────┐     │  Knowledge   │
//!        │ CLI/HTTP│──▶│ TutorService │────▶│    Index     │
//!        └─────────┘   └──────┬───────┘     └──────────────┘
//!                             ▼
//!                ask / quiz / learning path ──▶ Generator
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`lms`] | Learning-platform client and offline mock |
//! | [`grades`] | Grade-string parsing |
//! | [`extract`] | PDF, DOCX, and HTML text extraction |
//! | [`normalize`] | Course tree to per-module composite text |
//! | [`chunk`] | Boundary-seeking overlapping chunker |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`store`] | Chunk storage backends |
//! | [`index`] | Per-course knowledge index |
//! | [`retrieve`] | Course-scoped retrieval |
//! | [`prompts`] | Tutoring prompt and student context |
//! | [`quiz`] | Quiz prompt, parsing, and fallback |
//! | [`planner`] | Learning path planner |
//! | [`students`] | Profiles, progress, quiz ledger |
//! | [`conversation`] | Chat history |
//! | [`analytics`] | Class analytics |
//! | [`ingest`] | Ingestion pipeline |
//! | [`tutor`] | Service facade |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analytics;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod grades;
pub mod index;
pub mod ingest;
pub mod lms;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod planner;
pub mod prompts;
pub mod quiz;
pub mod retrieve;
pub mod server;
pub mod store;
pub mod students;
pub mod tutor;
