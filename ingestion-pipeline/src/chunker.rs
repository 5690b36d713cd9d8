//! Deterministic text segmentation. Chunk boundaries and ids are a pure
//! function of the document id and text, so re-chunking an unchanged
//! document reproduces identical records and re-publication overwrites
//! instead of duplicating.

use std::collections::VecDeque;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::gates::is_chunk_acceptable;

/// Coarse to fine: paragraph, line, sentence, word, character.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    PendingEmbedding,
    Embedded,
    EmbedFailed,
    Indexed,
}

/// One bounded, overlapping substring of a document's text. Chunks are
/// recomputed on every pass; the search index is their sink of record.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub ordinal: u32,
    pub total_for_document: u32,
    pub vector: Option<Vec<f32>>,
    pub status: ChunkStatus,
}

pub fn derive_chunk_id(document_id: &str, ordinal: u32) -> String {
    URL_SAFE_NO_PAD.encode(format!("{document_id}#{ordinal}"))
}

/// Splits, drops undersized chunks, and assigns ordinals in emission order
/// over the survivors.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_length: usize,
) -> Vec<Chunk> {
    let surviving: Vec<String> = split_text(text, chunk_size, chunk_overlap)
        .into_iter()
        .filter(|piece| is_chunk_acceptable(piece, min_chunk_length))
        .collect();

    let total = u32::try_from(surviving.len()).unwrap_or(u32::MAX);
    surviving
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let ordinal = u32::try_from(index).unwrap_or(u32::MAX);
            Chunk {
                id: derive_chunk_id(document_id, ordinal),
                document_id: document_id.to_string(),
                text,
                ordinal,
                total_for_document: total,
                vector: None,
                status: ChunkStatus::PendingEmbedding,
            }
        })
        .collect()
}

/// Recursive splitting: prefer the coarsest separator that still yields
/// pieces under `chunk_size`, then greedily merge adjacent pieces up to the
/// size bound, carrying `chunk_overlap` characters into the next chunk.
/// All sizes count characters, not bytes.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    split_recursive(text, chunk_size, chunk_overlap, &SEPARATORS)
}

fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    let (separator, finer) = pick_separator(text, separators);
    let pieces = split_keeping_separator(text, separator);

    let mut output = Vec::new();
    let mut mergeable: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) < chunk_size {
            mergeable.push(piece);
            continue;
        }

        if !mergeable.is_empty() {
            output.extend(merge_pieces(&mergeable, chunk_size, chunk_overlap));
            mergeable.clear();
        }
        if finer.is_empty() {
            output.push(piece);
        } else {
            output.extend(split_recursive(&piece, chunk_size, chunk_overlap, finer));
        }
    }
    if !mergeable.is_empty() {
        output.extend(merge_pieces(&mergeable, chunk_size, chunk_overlap));
    }
    output
}

/// First separator that actually occurs in the text; the empty separator is
/// the last resort and always matches.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (index, separator) in separators.iter().enumerate() {
        if separator.is_empty() || text.contains(separator) {
            return (separator, &separators[index + 1..]);
        }
    }
    ("", &[])
}

/// The separator stays attached to the end of the preceding piece so merges
/// are plain concatenation and never lose characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    text.split_inclusive(separator).map(str::to_owned).collect()
}

fn merge_pieces(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&String> = VecDeque::new();
    let mut window_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        if window_len + piece_len > chunk_size && !window.is_empty() {
            if let Some(chunk) = join_trimmed(&window) {
                chunks.push(chunk);
            }
            while window_len > chunk_overlap
                || (window_len + piece_len > chunk_size && window_len > 0)
            {
                match window.pop_front() {
                    Some(removed) => window_len -= char_len(removed),
                    None => break,
                }
            }
        }
        window.push_back(piece);
        window_len += piece_len;
    }

    if let Some(chunk) = join_trimmed(&window) {
        chunks.push(chunk);
    }
    chunks
}

fn join_trimmed(window: &VecDeque<&String>) -> Option<String> {
    let joined: String = window.iter().map(|piece| piece.as_str()).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_text(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{i:04}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = running_text(400);
        let first = split_text(&text, 800, 80);
        let second = split_text(&text, 800, 80);
        assert_eq!(first, second);
        assert!(first.len() > 1);
    }

    #[test]
    fn chunks_respect_the_size_bound() {
        let text = running_text(500);
        for chunk in split_text(&text, 800, 80) {
            assert!(chunk.len() <= 800, "chunk of {} exceeds bound", chunk.len());
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        // Words are unique, so shared words prove carried-over text.
        let text = running_text(500);
        let chunks = split_text(&text, 800, 80);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_word = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "chunk did not carry overlap into its successor"
            );
        }
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let first = "a".repeat(500);
        let second = "b".repeat(500);
        let text = format!("{first}\n\n{second}");
        let chunks = split_text(&text, 800, 80);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn unbroken_text_still_splits() {
        let text = "x".repeat(2000);
        let chunks = split_text(&text, 800, 80);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 800);
        }
    }

    #[test]
    fn sizes_are_measured_in_characters_not_bytes() {
        // Devanagari: three bytes per character, so byte counting would cut
        // these paragraphs into chunks a third of the intended size.
        let first = "\u{915}".repeat(500);
        let second = "\u{916}".repeat(500);
        let text = format!("{first}\n\n{second}");
        let chunks = split_text(&text, 800, 80);
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 800);
            assert!(chunk.len() > 800, "each chunk spans more bytes than characters");
        }
        assert_eq!(chunks[0].chars().count(), 500);
        assert_eq!(chunks[1].chars().count(), 500);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 800, 80).is_empty());
        assert!(chunk_document("doc", "", 800, 80, 150).is_empty());
    }

    #[test]
    fn ordinals_are_contiguous_and_ids_stable() {
        let text = running_text(600);
        let chunks = chunk_document("ZG9jLTE", &text, 800, 80, 150);
        assert!(!chunks.is_empty());
        let total = u32::try_from(chunks.len()).unwrap();
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, u32::try_from(index).unwrap());
            assert_eq!(chunk.total_for_document, total);
            assert_eq!(chunk.id, derive_chunk_id("ZG9jLTE", chunk.ordinal));
            assert_eq!(chunk.status, ChunkStatus::PendingEmbedding);
        }

        let again = chunk_document("ZG9jLTE", &text, 800, 80, 150);
        assert_eq!(chunks, again, "re-chunking unchanged text is byte-identical");
    }

    #[test]
    fn undersized_chunks_are_dropped_before_ordinals_are_assigned() {
        let long = "a".repeat(400);
        let short = "tail";
        let text = format!("{long}\n\n{short}");
        let chunks = chunk_document("doc", &text, 800, 80, 150);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].total_for_document, 1);
    }
}
