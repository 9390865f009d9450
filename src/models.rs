//! Core data models used throughout the tutor.
//!
//! These types describe the course material, knowledge chunks, student
//! snapshots, and generated artifacts that flow through ingestion and
//! retrieval.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of course module, as reported by the content source (`modname`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleType {
    Page,
    Quiz,
    Resource,
    Assign,
    Forum,
    Url,
    Label,
    Folder,
    Book,
    Unknown,
    /// Any other module plugin, kept verbatim.
    Other(String),
}

impl ModuleType {
    pub fn as_str(&self) -> &str {
        match self {
            ModuleType::Page => "page",
            ModuleType::Quiz => "quiz",
            ModuleType::Resource => "resource",
            ModuleType::Assign => "assign",
            ModuleType::Forum => "forum",
            ModuleType::Url => "url",
            ModuleType::Label => "label",
            ModuleType::Folder => "folder",
            ModuleType::Book => "book",
            ModuleType::Unknown => "unknown",
            ModuleType::Other(name) => name,
        }
    }
}

impl From<&str> for ModuleType {
    fn from(modname: &str) -> Self {
        match modname.trim().to_ascii_lowercase().as_str() {
            "page" => ModuleType::Page,
            "quiz" => ModuleType::Quiz,
            "resource" => ModuleType::Resource,
            "assign" => ModuleType::Assign,
            "forum" => ModuleType::Forum,
            "url" => ModuleType::Url,
            "label" => ModuleType::Label,
            "folder" => ModuleType::Folder,
            "book" => ModuleType::Book,
            "" | "unknown" => ModuleType::Unknown,
            other => ModuleType::Other(other.to_string()),
        }
    }
}

impl From<String> for ModuleType {
    fn from(modname: String) -> Self {
        ModuleType::from(modname.as_str())
    }
}

impl From<ModuleType> for String {
    fn from(module_type: ModuleType) -> Self {
        module_type.as_str().to_string()
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file attached to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mimetype: Option<String>,
    pub url: Option<String>,
}

/// One module of course material, flattened out of the content tree.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub course_id: i64,
    pub section_name: String,
    pub module_name: String,
    pub module_type: ModuleType,
    /// Module description with HTML already stripped.
    pub description_text: Option<String>,
    /// Inline body of page-like modules, HTML stripped.
    pub page_text: Option<String>,
    /// Rendered open/close dates for quiz-like modules.
    pub dates_text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl ContentItem {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata::new(
            self.course_id,
            &self.section_name,
            &self.module_name,
            self.module_type.clone(),
        )
    }
}

/// Metadata shared by every chunk cut from one module.
///
/// Field names on the wire follow the knowledge-base summary and chat
/// `sources` payloads: `course_id`, `source`, `type`, `module`, `section`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub course_id: i64,
    #[serde(rename = "source")]
    pub source_label: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    #[serde(rename = "module")]
    pub module_name: String,
    #[serde(rename = "section")]
    pub section_name: String,
}

impl ChunkMetadata {
    pub fn new(
        course_id: i64,
        section_name: &str,
        module_name: &str,
        module_type: ModuleType,
    ) -> Self {
        Self {
            course_id,
            source_label: format!("{} - {}", section_name, module_name),
            module_type,
            module_name: module_name.to_string(),
            section_name: section_name.to_string(),
        }
    }
}

/// A bounded span of composite text plus its module metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Student identity and learning attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub learning_style: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl StudentProfile {
    pub fn new_default(id: i64) -> Self {
        Self {
            id,
            name: "Unknown".to_string(),
            email: None,
            learning_style: "General".to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            interests: Vec::new(),
        }
    }
}

/// Student progress within one course. Scores are percentages in `[0, 100]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub completed_modules: Vec<String>,
    pub quiz_scores: BTreeMap<String, f64>,
}

/// Read-only snapshot of a student, as handed to the prompt composers.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentContext {
    pub name: String,
    pub learning_style: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub completed_modules: Vec<String>,
    pub quiz_scores: BTreeMap<String, f64>,
}

impl StudentContext {
    pub fn from_parts(profile: StudentProfile, progress: StudentProgress) -> Self {
        Self {
            name: profile.name,
            learning_style: profile.learning_style,
            strengths: profile.strengths,
            weaknesses: profile.weaknesses,
            completed_modules: progress.completed_modules,
            quiz_scores: progress.quiz_scores,
        }
    }
}

/// One multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSpec {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Outcome of the learning path planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LearningPathResult {
    Start {
        message: String,
        recommendations: Vec<String>,
    },
    OnTrack {
        message: String,
        recommendations: Vec<String>,
    },
    NeedsImprovement {
        weaknesses: Vec<String>,
        study_plan: String,
    },
}

/// Answer to a student question plus the metadata of the chunks it was
/// grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorAnswer {
    pub answer: String,
    pub sources: Vec<ChunkMetadata>,
}

/// One entry of the knowledge-base summary, keyed by module name and type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub chunk_count: usize,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSummary {
    pub course_id: i64,
    pub document_count: usize,
    pub sources: Vec<SourceSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    /// The content tree had no modules; the course index was cleared.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub course_id: i64,
    pub status: IngestStatus,
    pub chunk_count: usize,
    pub module_count: usize,
    pub extraction_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_round_trips_unknown_plugins() {
        assert_eq!(ModuleType::from("Quiz"), ModuleType::Quiz);
        assert_eq!(ModuleType::from(""), ModuleType::Unknown);
        let h5p = ModuleType::from("h5pactivity");
        assert_eq!(h5p.as_str(), "h5pactivity");
        let json = serde_json::to_string(&h5p).unwrap();
        assert_eq!(json, "\"h5pactivity\"");
    }

    #[test]
    fn test_metadata_source_label_and_wire_names() {
        let meta = ChunkMetadata::new(101, "Week 1", "What is AI?", ModuleType::Page);
        assert_eq!(meta.source_label, "Week 1 - What is AI?");

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["course_id"], 101);
        assert_eq!(json["source"], "Week 1 - What is AI?");
        assert_eq!(json["type"], "page");
        assert_eq!(json["module"], "What is AI?");
        assert_eq!(json["section"], "Week 1");
    }

    #[test]
    fn test_learning_path_result_is_tagged_by_status() {
        let result = LearningPathResult::NeedsImprovement {
            weaknesses: vec!["Algebra".to_string()],
            study_plan: "Step 1".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "needs_improvement");
        assert_eq!(json["weaknesses"][0], "Algebra");
    }
}
