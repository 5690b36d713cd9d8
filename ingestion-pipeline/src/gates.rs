//! Pure pass/fail checks between stages. No I/O, no side effects; callers
//! decide what a rejection means for the document.

use common::storage::types::metadata::JudgmentMetadata;

/// Extracted text is usable when it is long enough after trimming and the
/// extractor's confidence signal clears the floor. The confidence heuristic
/// itself belongs to the extraction service; this only enforces thresholds.
pub fn is_extraction_acceptable(
    text: &str,
    confidence: f32,
    min_text_length: usize,
    min_confidence: f32,
) -> bool {
    text.trim().chars().count() >= min_text_length && confidence >= min_confidence
}

/// Metadata is judged as a group: a case reference (name or number), a
/// court, and a parseable judgment date. Individual missing fields elsewhere
/// are fine.
pub fn is_metadata_acceptable(metadata: &JudgmentMetadata) -> bool {
    metadata.has_case_reference() && metadata.has_court() && metadata.judgment_date().is_some()
}

/// Undersized chunks are dropped, never retried.
pub fn is_chunk_acceptable(chunk_text: &str, min_chunk_length: usize) -> bool {
    chunk_text.trim().chars().count() >= min_chunk_length
}
