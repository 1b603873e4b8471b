//! Sentence-aligned text chunker with suffix overlap.
//!
//! Splits raw document text into [`TextChunk`]s bounded by a character
//! budget. Splitting happens only on sentence boundaries (`.`, `!`, `?`),
//! so a sentence is never cut in half; a single sentence longer than the
//! budget becomes its own oversized chunk.
//!
//! # Algorithm
//!
//! 1. Split the text into trimmed, non-empty sentences.
//! 2. Append sentences (newline-terminated) to a running buffer.
//! 3. When the next sentence would push the buffer past `max_chunk_size`
//!    and the buffer already holds at least one sentence, close the buffer
//!    as a chunk.
//! 4. Seed the next buffer with the trailing `overlap_size` characters of
//!    the closed chunk. The seed is dropped when seed + next sentence would
//!    already exceed the budget.
//! 5. Flush whatever remains as the final chunk.
//!
//! All sizes and offsets are counted in `char`s. The function is pure and
//! deterministic.
//!
//! # Example
//!
//! ```rust
//! use fragment_lens_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Short.", 2000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "Short");
//! ```

use serde::Serialize;

/// Default character budget per chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 2000;

/// Default number of trailing characters carried into the next chunk.
pub const DEFAULT_OVERLAP_SIZE: usize = 200;

/// Chunking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

/// One chunk of a document, with best-effort position bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Trimmed chunk text (includes any overlap seed).
    pub text: String,
    /// Position of this chunk within the document, starting at 0.
    pub index: usize,
    /// Character cursor where this chunk starts.
    pub start_offset: usize,
    /// `start_offset + char_count`.
    pub end_offset: usize,
    /// Whitespace-separated word count.
    pub word_count: usize,
    /// Length of `text` in chars.
    pub char_count: usize,
}

/// Split `text` into overlapping, sentence-aligned chunks.
///
/// Empty or whitespace-only input yields no chunks. Offsets advance by
/// `chunk_len - overlap_len` per chunk and are never decreasing; they are
/// bookkeeping, not an exact inverse of the input text.
pub fn chunk_text(text: &str, max_chunk_size: usize, overlap_size: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    if text.trim().is_empty() {
        return chunks;
    }

    let mut buf = String::new();
    let mut buf_chars = 0usize;
    let mut has_sentence = false;
    let mut cursor = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();

        if has_sentence && buf_chars + sentence_chars > max_chunk_size {
            let closed = make_chunk(chunks.len(), cursor, &buf);
            let overlap = tail_chars(&closed.text, overlap_size).to_string();
            let overlap_chars = overlap.chars().count();
            cursor += closed.char_count - overlap_chars;
            chunks.push(closed);

            buf.clear();
            buf_chars = 0;

            if overlap_chars > 0 && overlap_chars + 1 + sentence_chars <= max_chunk_size {
                buf.push_str(&overlap);
                buf.push('\n');
                buf_chars = overlap_chars + 1;
            }
        }

        buf.push_str(sentence);
        buf.push('\n');
        buf_chars += sentence_chars + 1;
        has_sentence = true;
    }

    if has_sentence {
        chunks.push(make_chunk(chunks.len(), cursor, &buf));
    }

    chunks
}

/// Split text into trimmed, non-empty sentence units.
pub fn split_sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// The last `n` chars of `s` (all of `s` if it is shorter).
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = s.chars().count();
    if len <= n {
        return s;
    }
    match s.char_indices().nth(len - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

fn make_chunk(index: usize, start_offset: usize, buf: &str) -> TextChunk {
    let text = buf.trim().to_string();
    let char_count = text.chars().count();
    TextChunk {
        word_count: text.split_whitespace().count(),
        char_count,
        index,
        start_offset,
        end_offset: start_offset + char_count,
        text,
    }
}
