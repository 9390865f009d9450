//! Content normalizer: course tree to per-module composite text.
//!
//! Walks sections, then modules, in the order the platform returned them.
//! Each module becomes one [`NormalizedModule`] whose composite text reads:
//!
//! ```text
//! Course ID: 101
//! Section: Week 1
//! Module: What is AI?
//! Type: resource
//! Description: ...
//! Dates: ...
//! Content: ...
//! File Attachment: intro.pdf
//! --- BEGIN PDF CONTENT (intro.pdf) ---
//! ...
//! --- END PDF CONTENT (intro.pdf) ---
//! ```
//!
//! Optional lines are omitted when empty. A module with nothing but its
//! header still produces a record. Attachment failures become a bracketed
//! placeholder line and are counted, never raised.

use chrono::DateTime;
use tracing::{debug, warn};

use crate::extract::{self, DocumentKind, ExtractError, ExtractedText};
use crate::lms::{ContentSource, CourseModule, CourseSection, ModuleDate};
use crate::models::{Attachment, ContentItem, ModuleType};

const UNNAMED_SECTION: &str = "Unnamed Section";
const UNNAMED_MODULE: &str = "Unnamed Module";

/// One module ready for chunking.
#[derive(Debug, Clone)]
pub struct NormalizedModule {
    pub item: ContentItem,
    pub composite: String,
    pub extraction_failures: usize,
}

/// Extraction outcome for one attachment.
#[derive(Debug, Clone)]
pub struct AttachmentText {
    pub attachment: Attachment,
    pub kind: DocumentKind,
    pub text: ExtractedText,
}

/// Flatten the course tree into content items, preserving platform order.
pub fn content_items(course_id: i64, sections: &[CourseSection]) -> Vec<ContentItem> {
    let mut items = Vec::new();
    for section in sections {
        let section_name = non_empty(section.name.as_deref()).unwrap_or(UNNAMED_SECTION);
        for module in &section.modules {
            items.push(item_from_module(course_id, section_name, module));
        }
    }
    items
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn item_from_module(course_id: i64, section_name: &str, module: &CourseModule) -> ContentItem {
    let module_type = ModuleType::from(module.modname.as_deref().unwrap_or("unknown"));

    let description_text = module
        .description
        .as_deref()
        .map(extract::strip_html)
        .filter(|d| !d.is_empty());

    let page_parts: Vec<String> = module
        .contents
        .iter()
        .filter_map(|c| c.content.as_deref())
        .map(extract::strip_html)
        .filter(|c| !c.is_empty())
        .collect();
    let page_text = (!page_parts.is_empty()).then(|| page_parts.join("\n"));

    let dates_text = (module_type == ModuleType::Quiz && !module.dates.is_empty())
        .then(|| render_dates(&module.dates));

    let attachments = module
        .contents
        .iter()
        .filter_map(|c| {
            let filename = non_empty(c.filename.as_deref())?;
            Some(Attachment {
                filename: filename.to_string(),
                mimetype: c.mimetype.clone(),
                url: c.fileurl.clone(),
            })
        })
        .collect();

    ContentItem {
        course_id,
        section_name: section_name.to_string(),
        module_name: non_empty(module.name.as_deref())
            .unwrap_or(UNNAMED_MODULE)
            .to_string(),
        module_type,
        description_text,
        page_text,
        dates_text,
        attachments,
    }
}

fn render_dates(dates: &[ModuleDate]) -> String {
    dates
        .iter()
        .map(|d| {
            let when = DateTime::from_timestamp(d.timestamp, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| d.timestamp.to_string());
            format!("{} {}", d.label.trim(), when).trim().to_string()
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Assemble the composite text for one module.
pub fn render_composite(item: &ContentItem, attachments: &[AttachmentText]) -> String {
    let mut text = format!(
        "Course ID: {}\nSection: {}\nModule: {}\nType: {}\n",
        item.course_id, item.section_name, item.module_name, item.module_type
    );
    if let Some(description) = &item.description_text {
        text.push_str(&format!("Description: {}\n", description));
    }
    if let Some(dates) = &item.dates_text {
        text.push_str(&format!("Dates: {}\n", dates));
    }
    if let Some(page) = &item.page_text {
        text.push_str(&format!("Content: {}\n", page));
    }

    for extracted in attachments {
        let filename = &extracted.attachment.filename;
        text.push_str(&format!("File Attachment: {}\n", filename));
        match &extracted.text {
            Ok(body) if body.trim().is_empty() => {}
            Ok(body) => {
                let label = extracted.kind.label();
                text.push_str(&format!(
                    "--- BEGIN {label} CONTENT ({filename}) ---\n{}\n--- END {label} CONTENT ({filename}) ---\n",
                    body.trim_end()
                ));
            }
            Err(err) => text.push_str(&format!("[{}]\n", err)),
        }
    }
    text
}

/// Download and extract one attachment. Never fails; failures are values.
pub async fn extract_attachment(
    attachment: &Attachment,
    source: &dyn ContentSource,
) -> AttachmentText {
    let kind = DocumentKind::detect(&attachment.filename, attachment.mimetype.as_deref());
    let text = fetch_and_extract(attachment, kind, source).await;

    match &text {
        Ok(body) => debug!(
            filename = %attachment.filename,
            chars = body.len(),
            "extracted attachment"
        ),
        Err(err) => warn!(filename = %attachment.filename, error = %err, "attachment not extracted"),
    }

    AttachmentText {
        attachment: attachment.clone(),
        kind,
        text,
    }
}

async fn fetch_and_extract(
    attachment: &Attachment,
    kind: DocumentKind,
    source: &dyn ContentSource,
) -> ExtractedText {
    if let Some(err) = extract::skipped(kind, &attachment.filename, attachment.mimetype.as_deref())
    {
        return Err(err);
    }

    let download_failed = || ExtractError::Download {
        filename: attachment.filename.clone(),
    };
    let url = non_empty(attachment.url.as_deref()).ok_or_else(download_failed)?;
    let bytes = source.download_file(url).await.ok_or_else(download_failed)?;

    let filename = attachment.filename.clone();
    let mimetype = attachment.mimetype.clone();
    tokio::task::spawn_blocking(move || {
        extract::extract_text(&bytes, &filename, mimetype.as_deref())
    })
    .await
    .unwrap_or_else(|join_err| {
        Err(ExtractError::for_kind(
            kind,
            &attachment.filename,
            join_err.to_string(),
        ))
    })
}

/// Normalize a whole course tree, downloading attachments through `source`.
pub async fn normalize(
    course_id: i64,
    sections: &[CourseSection],
    source: &dyn ContentSource,
) -> Vec<NormalizedModule> {
    let items = content_items(course_id, sections);
    let mut modules = Vec::with_capacity(items.len());

    for item in items {
        let mut extracted = Vec::with_capacity(item.attachments.len());
        for attachment in &item.attachments {
            extracted.push(extract_attachment(attachment, source).await);
        }
        let extraction_failures = extracted.iter().filter(|a| a.text.is_err()).count();
        let composite = render_composite(&item, &extracted);
        modules.push(NormalizedModule {
            item,
            composite,
            extraction_failures,
        });
    }
    modules
}
