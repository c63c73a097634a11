//! Deterministic paragraph chunking for retrieval.

use sha2::{Digest, Sha256};

/// Maximum characters per chunk.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Split text on blank lines and pack paragraphs into chunks of at most
/// [`MAX_CHUNK_CHARS`] characters. Oversized paragraphs are hard-split.
pub fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_chars = paragraph.chars().count();

        if paragraph_chars > MAX_CHUNK_CHARS {
            flush(&mut chunks, &mut current, &mut current_chars);
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(MAX_CHUNK_CHARS) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        // Each packed paragraph is followed by a blank-line separator.
        if current_chars + paragraph_chars <= MAX_CHUNK_CHARS {
            current.push_str(paragraph);
            current.push_str("\n\n");
            current_chars += paragraph_chars + 2;
        } else {
            flush(&mut chunks, &mut current, &mut current_chars);
            current.push_str(paragraph);
            current.push_str("\n\n");
            current_chars = paragraph_chars + 2;
        }
    }

    flush(&mut chunks, &mut current, &mut current_chars);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_chars: &mut usize) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
    *current_chars = 0;
}

/// Stable chunk identifier: `<evidence_id>:<first 16 hex chars of sha256(chunk)>`.
pub fn chunk_id(evidence_id: &str, chunk: &str) -> String {
    let digest = hex::encode(Sha256::digest(chunk.as_bytes()));
    format!("{evidence_id}:{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_small_paragraphs_together() {
        let chunks = chunk_text("first paragraph\n\nsecond paragraph\n\n\n\nthird");
        assert_eq!(chunks, vec!["first paragraph\n\nsecond paragraph\n\nthird"]);
    }

    #[test]
    fn starts_new_chunk_when_full() {
        let a = "a".repeat(700);
        let b = "b".repeat(700);
        let chunks = chunk_text(&format!("{a}\n\n{b}"));
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn hard_splits_oversized_paragraphs() {
        let big = "x".repeat(MAX_CHUNK_CHARS * 2 + 10);
        let chunks = chunk_text(&format!("intro\n\n{big}"));
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], "intro");
        assert_eq!(chunks[1].len(), MAX_CHUNK_CHARS);
        assert_eq!(chunks[3].len(), 10);
    }

    #[test]
    fn hard_split_respects_char_boundaries() {
        let big = "é".repeat(MAX_CHUNK_CHARS + 1);
        let chunks = chunk_text(&big);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_CHUNK_CHARS);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("\n\n  \n\n").is_empty());
    }

    #[test]
    fn chunk_id_is_stable_and_prefixed() {
        let id = chunk_id("abc", "hello");
        assert_eq!(id, "abc:2cf24dba5fb0a30e");
        assert_eq!(id, chunk_id("abc", "hello"));
        assert_ne!(id, chunk_id("abc", "hello!"));
    }
}
