//! Boundary-seeking text chunker with exact overlap.
//!
//! Splits composite module text into chunks of at most `chunk_size`
//! characters. Consecutive chunks share exactly `overlap` characters, so
//! dropping the first `overlap` characters of every chunk after the first and
//! concatenating reproduces the input byte-for-byte.
//!
//! Cut points prefer, in order: paragraph breaks (`\n\n`), sentence ends,
//! line breaks, then spaces, searched in the back half of the window. With
//! no boundary in range the cut is a hard character cut. Sizes are counted in
//! `char`s, so a cut never lands inside a UTF-8 sequence.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{ContentItem, KnowledgeChunk};

/// Separator groups, strongest first. Within a group the latest match wins.
const BREAK_PRIORITY: &[&[&str]] = &[
    &["\n\n"],
    &[". ", ".\n", "? ", "?\n", "! ", "!\n"],
    &["\n"],
    &[" ", "\t"],
];

/// Split `text` into overlapping chunks. Empty input yields no chunks.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    split_ranges(text, chunk_size, overlap)
        .into_iter()
        .map(|(start, end)| text[start..end].to_string())
        .collect()
}

/// Chunk one module's composite text, stamping each chunk with the module
/// metadata.
pub fn chunk_item(
    item: &ContentItem,
    composite: &str,
    config: &ChunkingConfig,
) -> Vec<KnowledgeChunk> {
    let metadata = item.metadata();
    split(composite, config.chunk_size, config.overlap)
        .into_iter()
        .map(|text| KnowledgeChunk {
            text,
            metadata: metadata.clone(),
        })
        .collect()
}

/// SHA-256 of a chunk's text, hex encoded.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Byte ranges of each chunk.
fn split_ranges(text: &str, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    if text.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    // bounds[i] is the byte offset of char i; the last entry is text.len().
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let mut ranges = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + chunk_size).min(total_chars);
        if hard_end == total_chars {
            ranges.push((bounds[start], bounds[total_chars]));
            break;
        }

        // Every non-final chunk is longer than the overlap, so the next
        // start always moves forward.
        let floor = (start + overlap + 1).max(start + chunk_size / 2);
        let end = find_break_point(text, &bounds, floor, hard_end).unwrap_or(hard_end);

        ranges.push((bounds[start], bounds[end]));
        start = end - overlap;
    }
    ranges
}

/// Char index just past the best separator inside `[floor, end)`.
fn find_break_point(text: &str, bounds: &[usize], floor: usize, end: usize) -> Option<usize> {
    if floor >= end {
        return None;
    }
    let window_start = bounds[floor];
    let window = &text[window_start..bounds[end]];

    for group in BREAK_PRIORITY {
        let best = group
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
            .max();
        if let Some(offset) = best {
            // Separators are ASCII, so the cut is on a char boundary.
            if let Ok(idx) = bounds.binary_search(&(window_start + offset)) {
                return Some(idx);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for section in 0..12 {
            text.push_str(&format!(
                "Section {section}. Gradient descent updates weights. \
                 The learning rate controls the step size! Does it converge?\n"
            ));
            text.push_str("Backpropagation computes gradients layer by layer.\n\n");
        }
        text
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split("", 1000, 200).is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = split("Course ID: 101\nSection: Week 1\n", 1000, 200);
        assert_eq!(chunks, vec!["Course ID: 101\nSection: Week 1\n".to_string()]);
    }

    #[test]
    fn test_rejoin_reconstructs_original() {
        let text = sample_text();
        let chunks = split(&text, 300, 60);
        assert!(chunks.len() > 3);
        assert_eq!(rejoin(&chunks, 60), text);
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let text = sample_text();
        let chunks = split(&text, 250, 40);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .chars()
                .rev()
                .take(40)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let head: String = pair[1].chars().take(40).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_chunks_never_exceed_chunk_size() {
        let text = sample_text();
        for chunk in split(&text, 200, 50) {
            assert!(chunk.chars().count() <= 200);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "word ".repeat(30);
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        let chunks = split(&text, 200, 20);
        assert!(chunks[0].ends_with("\n\n"));
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "x".repeat(2500);
        let chunks = split(&text, 1000, 200);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(rejoin(&chunks, 200), text);
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "Überblick über Lernpfade 🚀. ".repeat(80);
        let chunks = split(&text, 120, 30);
        assert!(chunks.len() > 1);
        assert_eq!(rejoin(&chunks, 30), text);
    }

    #[test]
    fn test_overlap_is_clamped_below_chunk_size() {
        let text = "abcdefghij".repeat(5);
        let chunks = split(&text, 10, 25);
        assert_eq!(rejoin(&chunks, 9), text);
    }

    #[test]
    fn test_text_hash_is_stable() {
        assert_eq!(text_hash("abc"), text_hash("abc"));
        assert_ne!(text_hash("abc"), text_hash("abd"));
        assert_eq!(text_hash("").len(), 64);
    }
}
