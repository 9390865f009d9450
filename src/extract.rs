//! Text extraction for course attachments (PDF, DOCX, HTML).
//!
//! The normalizer hands over downloaded bytes plus the attachment's filename
//! and declared mimetype; this module returns plain UTF-8 text or an
//! [`ExtractError`]. Extraction never panics and never returns early for the
//! caller: every failure is a value the caller renders inline.

use regex::Regex;
use std::io::Read;
use std::sync::LazyLock;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_HTML: &str = "text/html";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("html tag regex is valid"));

/// Per-attachment extraction failure. Rendered into composite text as
/// `[{message}]`, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("Unsupported format: {filename} ({mimetype})")]
    Unsupported { filename: String, mimetype: String },

    #[error("WARNING: .doc file ({filename}) skipped. Please convert to .docx or PDF for AI ingestion.")]
    LegacyDoc { filename: String },

    #[error("Error reading PDF content: {0}")]
    Pdf(String),

    #[error("Error reading DOCX content: {0}")]
    Docx(String),

    #[error("Error reading HTML content: {0}")]
    Html(String),

    #[error("Error downloading {filename}: file could not be retrieved")]
    Download { filename: String },
}

/// Result of extracting one attachment: text, or the reason there is none.
pub type ExtractedText = Result<String, ExtractError>;

/// Extraction path chosen for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Html,
    /// Legacy binary Word. Never parsed.
    LegacyDoc,
    Unsupported,
}

impl DocumentKind {
    /// Classify by declared mimetype first, then by filename extension.
    pub fn detect(filename: &str, mimetype: Option<&str>) -> Self {
        let by_mime = match mimetype.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) if m == MIME_PDF => Some(DocumentKind::Pdf),
            Some(m) if m == MIME_DOCX => Some(DocumentKind::Docx),
            Some(m) if m == MIME_DOC => Some(DocumentKind::LegacyDoc),
            Some(m) if m.starts_with(MIME_HTML) => Some(DocumentKind::Html),
            _ => None,
        };
        if let Some(kind) = by_mime {
            return kind;
        }

        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            DocumentKind::Pdf
        } else if lower.ends_with(".docx") {
            DocumentKind::Docx
        } else if lower.ends_with(".doc") {
            DocumentKind::LegacyDoc
        } else if lower.ends_with(".html") || lower.ends_with(".htm") {
            DocumentKind::Html
        } else {
            DocumentKind::Unsupported
        }
    }

    /// Whether the bytes are worth downloading at all.
    pub fn is_extractable(self) -> bool {
        matches!(
            self,
            DocumentKind::Pdf | DocumentKind::Docx | DocumentKind::Html
        )
    }

    /// Marker label used around extracted text in composite records.
    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Docx => "DOCX",
            DocumentKind::Html => "HTML",
            DocumentKind::LegacyDoc => "DOC",
            DocumentKind::Unsupported => "FILE",
        }
    }
}

impl ExtractError {
    /// Parse failure attributed to the extraction path that raised it.
    pub fn for_kind(kind: DocumentKind, filename: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            DocumentKind::Pdf => ExtractError::Pdf(message),
            DocumentKind::Docx => ExtractError::Docx(message),
            DocumentKind::Html => ExtractError::Html(message),
            DocumentKind::LegacyDoc => ExtractError::LegacyDoc {
                filename: filename.to_string(),
            },
            DocumentKind::Unsupported => ExtractError::Unsupported {
                filename: filename.to_string(),
                mimetype: message,
            },
        }
    }
}

/// Failure to report for kinds that are never downloaded.
pub fn skipped(kind: DocumentKind, filename: &str, mimetype: Option<&str>) -> Option<ExtractError> {
    match kind {
        DocumentKind::LegacyDoc => Some(ExtractError::LegacyDoc {
            filename: filename.to_string(),
        }),
        DocumentKind::Unsupported => Some(ExtractError::Unsupported {
            filename: filename.to_string(),
            mimetype: mimetype.unwrap_or("unknown").to_string(),
        }),
        _ => None,
    }
}

/// Extracts plain text from an attachment's bytes.
pub fn extract_text(bytes: &[u8], filename: &str, mimetype: Option<&str>) -> ExtractedText {
    match DocumentKind::detect(filename, mimetype) {
        DocumentKind::Pdf => extract_pdf(bytes),
        DocumentKind::Docx => extract_docx(bytes),
        DocumentKind::Html => Ok(strip_html(&String::from_utf8_lossy(bytes))),
        DocumentKind::LegacyDoc => Err(ExtractError::LegacyDoc {
            filename: filename.to_string(),
        }),
        DocumentKind::Unsupported => Err(ExtractError::Unsupported {
            filename: filename.to_string(),
            mimetype: mimetype.unwrap_or("unknown").to_string(),
        }),
    }
}

/// Removes every `<...>` tag and trims the result. Entities are left as-is.
pub fn strip_html(html: &str) -> String {
    HTML_TAG_RE.replace_all(html, "").trim().to_string()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "parser panicked".to_string()
    }
}

fn extract_pdf(bytes: &[u8]) -> ExtractedText {
    // pdf-extract panics on some malformed streams.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|payload| ExtractError::Pdf(panic_message(payload)))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut out = String::new();
    for page in pages.iter().filter(|p| !p.trim().is_empty()) {
        out.push_str(page);
        out.push('\n');
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> ExtractedText {
    std::panic::catch_unwind(|| read_docx_paragraphs(bytes))
        .map_err(|payload| ExtractError::Docx(panic_message(payload)))?
}

fn read_docx_paragraphs(bytes: &[u8]) -> ExtractedText {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    Ok(collect_paragraphs(&doc_xml)?.join("\n"))
}

/// Walks WordprocessingML and returns one string per `w:p`, in document order.
fn collect_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_run = false;
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if in_run => current.push('\t'),
                b"br" | b"cr" if in_run => current.push('\n'),
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}
