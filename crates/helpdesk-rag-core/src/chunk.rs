//! Recursive boundary-aware text chunker with overlap.
//!
//! Splits each [`Document`]'s text into overlapping [`Chunk`]s of at most
//! `chunk_size` characters. Sizes are counted in Unicode scalar values, so
//! multi-byte text never splits inside a character.
//!
//! # Algorithm
//!
//! 1. Start a window at `start`. If the remainder fits in `chunk_size`, emit it
//!    and stop.
//! 2. Otherwise look for the latest break point in
//!    `(start + overlap, start + chunk_size]`, trying separator levels in order:
//!    paragraph (`\n\n`), line (`\n`), sentence (`. ` `! ` `? `), word (` `).
//!    A level is only consulted when every coarser level has no candidate.
//! 3. With no boundary at any level, cut hard at `start + chunk_size`.
//! 4. The next window starts `overlap` characters before the previous end,
//!    snapped forward to the start of a word when the overlap contains a space.
//!
//! # Guarantees
//!
//! - Every character of the document lies in at least one chunk.
//! - Chunk texts are exact slices of the document text (no trimming).
//! - Consecutive chunks share at most `overlap` characters, and exactly
//!   `overlap` when no word boundary snapping applies.
//! - Deterministic: the same input always yields the same chunks.
//!
//! # Example
//!
//! ```rust
//! use helpdesk_rag_core::chunk::{split_document, ChunkingParams};
//! use helpdesk_rag_core::{Document, DocumentKind};
//!
//! let doc = Document::new("faq.csv", DocumentKind::Row, 0, "Hello world.".into());
//! let chunks = split_document(&doc, &ChunkingParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Hello world.");
//! ```

use crate::error::RagError;
use crate::models::{Chunk, Document};

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default characters shared by consecutive chunks of one document.
pub const DEFAULT_OVERLAP: usize = 50;

/// Break-point separators, coarsest first.
const SEPARATOR_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// Validated chunk size / overlap pair. `overlap < chunk_size` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingParams {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::InvalidChunking(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(RagError::InvalidChunking(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Chunk every document, preserving corpus order.
pub fn chunk_documents(docs: &[Document], params: &ChunkingParams) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|doc| split_document(doc, params))
        .collect()
}

/// Split one document into ordered, overlapping chunks.
///
/// Returns an empty `Vec` for empty text.
pub fn split_document(doc: &Document, params: &ChunkingParams) -> Vec<Chunk> {
    let chars: Vec<char> = doc.text.chars().collect();

    split_spans(&chars, params)
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| Chunk {
            document_id: doc.id.clone(),
            source: doc.source.clone(),
            position: doc.position,
            index,
            start,
            end,
            text: chars[start..end].iter().collect(),
        })
        .collect()
}

/// Compute `[start, end)` character spans for a text.
fn split_spans(chars: &[char], params: &ChunkingParams) -> Vec<(usize, usize)> {
    let n = chars.len();
    let mut spans = Vec::new();
    if n == 0 {
        return spans;
    }

    let mut start = 0;
    loop {
        if n - start <= params.chunk_size {
            spans.push((start, n));
            break;
        }

        let hard_end = start + params.chunk_size;
        // The end must leave room for a strictly advancing next start.
        let min_end = start + params.overlap + 1;
        let end = find_break(chars, start, min_end, hard_end, SEPARATOR_LEVELS).unwrap_or(hard_end);

        spans.push((start, end));
        start = next_start(chars, end, params.overlap);
    }

    spans
}

/// Latest `p` in `[lo, hi]` where a separator of the coarsest level that has
/// any candidate ends exactly at `p` (and begins at or after `floor`).
fn find_break(
    chars: &[char],
    floor: usize,
    lo: usize,
    hi: usize,
    levels: &[&[&str]],
) -> Option<usize> {
    let (level, finer) = levels.split_first()?;

    (lo..=hi)
        .rev()
        .find(|&p| level.iter().any(|sep| separator_ends_at(chars, floor, p, sep)))
        .or_else(|| find_break(chars, floor, lo, hi, finer))
}

fn separator_ends_at(chars: &[char], floor: usize, p: usize, sep: &str) -> bool {
    let len = sep.chars().count();
    p >= floor + len && p <= chars.len() && chars[p - len..p].iter().copied().eq(sep.chars())
}

/// Start of the next window: `overlap` characters back from `end`, moved
/// forward to the beginning of a word when possible.
fn next_start(chars: &[char], end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }

    let raw = end - overlap;
    if chars[raw - 1].is_whitespace() {
        return raw;
    }

    match (raw..end).find(|&i| chars[i].is_whitespace()) {
        Some(ws) if ws + 1 < end => ws + 1,
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentKind;

    fn doc(text: &str) -> Document {
        Document::new("manual.pdf", DocumentKind::Page, 1, text.to_string())
    }

    fn params(size: usize, overlap: usize) -> ChunkingParams {
        ChunkingParams::new(size, overlap).unwrap()
    }

    fn assert_covers(text: &str, chunks: &[Chunk]) {
        let n = text.chars().count();
        let mut covered = vec![false; n];
        for c in chunks {
            for flag in &mut covered[c.start..c.end] {
                *flag = true;
            }
        }
        assert!(covered.iter().all(|c| *c), "not every character is covered");
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_document(&doc("Hello, world!"), &ChunkingParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 13));
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(split_document(&doc(""), &ChunkingParams::default()).is_empty());
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(
            ChunkingParams::new(0, 0),
            Err(RagError::InvalidChunking(_))
        ));
        assert!(matches!(
            ChunkingParams::new(50, 50),
            Err(RagError::InvalidChunking(_))
        ));
        assert!(ChunkingParams::new(50, 49).is_ok());
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "First paragraph is here.\n\nSecond paragraph follows. It is longer than the rest.";
        let chunks = split_document(&doc(text), &params(40, 5));
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text, "First paragraph is here.\n\n");
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let text = "Reset the router now. Then wait for the light to turn solid green";
        let chunks = split_document(&doc(text), &params(30, 0));
        assert_eq!(chunks[0].text, "Reset the router now. ");
    }

    #[test]
    fn test_falls_back_to_word_boundary() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = split_document(&doc(text), &params(20, 0));
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with(' '), "chunk {:?} not cut at a word", c.text);
        }
        assert_covers(text, &chunks);
    }

    #[test]
    fn test_hard_cut_has_exact_overlap() {
        let text = "x".repeat(95);
        let chunks = split_document(&doc(&text), &params(20, 5));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 5);
            assert_eq!(pair[0].char_len(), 20);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_overlap_bound_and_size_bound() {
        let text = (0..80)
            .map(|i| format!("Sentence number {} explains a feature.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let p = params(120, 30);
        let chunks = split_document(&doc(&text), &p);
        assert!(chunks.len() > 5);
        for c in &chunks {
            assert!(c.char_len() <= p.chunk_size());
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "gap between chunks");
            assert!(pair[1].start > pair[0].start, "no progress");
            let shared = pair[0].end - pair[1].start;
            assert!(shared <= p.overlap(), "shared {} > overlap", shared);
        }
        assert_covers(&text, &chunks);
    }

    #[test]
    fn test_chunk_text_matches_span() {
        let text = "Line one.\nLine two is a bit longer.\nLine three.\n\nNew paragraph here.";
        let d = doc(text);
        let chunks = split_document(&d, &params(25, 6));
        for c in &chunks {
            let expected: String = d.text.chars().skip(c.start).take(c.char_len()).collect();
            assert_eq!(c.text, expected);
            assert_eq!(c.document_id, d.id);
        }
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello wörld ✓    │\n└──────────────────┘";
        let chunks = split_document(&doc(text), &params(12, 3));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() <= 12);
        }
        assert_covers(text, &chunks);
    }

    #[test]
    fn test_zero_overlap_partitions_text() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = split_document(&doc(text), &params(15, 0));
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta gamma delta.\n\nEpsilon zeta eta theta iota kappa lambda mu.";
        let c1 = split_document(&doc(text), &params(16, 4));
        let c2 = split_document(&doc(text), &params(16, 4));
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_chunk_documents_keeps_corpus_order() {
        let docs = vec![
            Document::new("a.csv", DocumentKind::Row, 0, "first row".into()),
            Document::new("a.csv", DocumentKind::Row, 1, "".into()),
            Document::new("a.csv", DocumentKind::Row, 2, "third row".into()),
        ];
        let chunks = chunk_documents(&docs, &ChunkingParams::default());
        let positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 2]);
    }
}
